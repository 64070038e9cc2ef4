//! The buildable-component abstraction and its fixed lifecycle.
//!
//! A recipe only describes *what* it is (name, source, dependencies) and how to configure,
//! compile and install it. Fetching, unpacking and patching are shared and driven by [`build`]:
//!
//! ```text
//! fetch -> unpack -> patch -> configure -> compile -> install
//! ```
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::{
    context::BuildContext,
    download::{archive_filename, archive_stem, cache_path, fetch, unpack},
    error::{BuildError, Phase},
    patch::apply_all,
};

/// Where a recipe's sources come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub uri: String,
    /// Pinned SHA256. `None` disables verification for this source.
    pub sha256: Option<String>,
}

impl Source {
    pub fn new(uri: impl Into<String>, sha256: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sha256: Some(sha256.into()),
        }
    }

    /// A source without a pinned checksum.
    pub fn unverified(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            sha256: None,
        }
    }
}

pub trait Recipe {
    /// Unique key of the recipe. Also names its completion marker.
    fn name(&self) -> &str;

    fn source(&self) -> &Source;

    /// Recipes that must be built before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Whether the recipe is part of the buildable set. Shared base definitions return `false`.
    fn is_buildable(&self) -> bool {
        true
    }

    /// Directory inside the unpacked archive holding the sources, relative to
    /// [`BuildContext::source_dir`]. Defaults to the archive name without its extension.
    fn source_root(&self) -> Result<PathBuf> {
        default_source_root(self.source())
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()>;

    fn compile(&self, ctx: &BuildContext) -> Result<()>;

    fn install(&self, ctx: &BuildContext) -> Result<()>;
}

/// The archive name without its extension, e.g. `binutils-2.42`.
pub fn default_source_root(source: &Source) -> Result<PathBuf> {
    Ok(PathBuf::from(archive_stem(archive_filename(&source.uri)?)))
}

/// Absolute path of the recipe's unpacked source tree.
pub fn sources_root(recipe: &dyn Recipe, ctx: &BuildContext) -> Result<PathBuf> {
    Ok(ctx.source_dir(recipe.name()).join(recipe.source_root()?))
}

/// Turn a configure/compile/install error that doesn't carry a kind yet into
/// [`BuildError::BuildPhase`].
fn in_phase(recipe: &dyn Recipe, phase: Phase, err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<BuildError>().is_some() {
        return err;
    }
    BuildError::BuildPhase {
        component: recipe.name().to_string(),
        phase,
        reason: format!("{err:#}"),
    }
    .into()
}

/// Run the full lifecycle of `recipe`.
///
/// Any failing phase aborts the build; nothing is retried.
pub fn build(recipe: &dyn Recipe, ctx: &BuildContext) -> Result<()> {
    let name = recipe.name();
    let source = recipe.source();
    let expected = source.sha256.as_deref();

    log::info!("=> build {name}");

    let archive = cache_path(ctx.download_dir()?, &source.uri)?;
    fetch(&source.uri, &archive, expected, ctx.skip_verification)
        .with_context(|| format!("{name}: {} failed", Phase::Fetch))?;

    unpack(
        &archive,
        ctx.source_dir(name),
        expected,
        ctx.skip_verification,
    )
    .with_context(|| format!("{name}: {} failed", Phase::Unpack))?;

    let root = sources_root(recipe, ctx)?;
    apply_all(ctx, name, &root).with_context(|| format!("{name}: {} failed", Phase::Patch))?;

    log::info!("=> configure {name}");
    recipe
        .configure(ctx)
        .map_err(|e| in_phase(recipe, Phase::Configure, e))?;

    log::info!("=> compile {name}");
    recipe
        .compile(ctx)
        .map_err(|e| in_phase(recipe, Phase::Compile, e))?;

    log::info!("=> install {name}");
    recipe
        .install(ctx)
        .map_err(|e| in_phase(recipe, Phase::Install, e))?;

    Ok(())
}
