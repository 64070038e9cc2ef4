//! Recipes defined in TOML files.
//!
//! ```toml
//! name = "gdb"
//! source = "https://ftp.gnu.org/gnu/gdb/gdb-14.1.tar.xz"
//! sha256 = "..."
//! dependencies = ["binutils"]
//!
//! [env]
//! CFLAGS = "-O2"
//!
//! [configure]
//! args = ["--target={target}", "--prefix={prefix}", "--disable-nls"]
//!
//! [compile]
//! args = ["-j{jobs}"]
//!
//! [install]
//! args = ["install"]
//! ```
//!
//! Configure runs `../configure` and the other steps run `make`, all inside `<root>/build`. A
//! step can name a different `command`. A file with `buildable = false` is a shared definition
//! and never built on its own.
use std::{
    collections::BTreeMap,
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    commands::Env,
    context::BuildContext,
    error::{BuildError, Phase},
    recipe::{Recipe, Source, default_source_root, sources_root},
};

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Step {
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct ManifestFile {
    name: String,
    source: String,
    sha256: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default = "yes")]
    buildable: bool,
    root: Option<PathBuf>,
    #[serde(default)]
    env: BTreeMap<String, String>,
    configure: Option<Step>,
    compile: Option<Step>,
    install: Option<Step>,
}

#[derive(Debug, Clone)]
pub struct ManifestRecipe {
    name: String,
    source: Source,
    dependencies: Vec<String>,
    buildable: bool,
    root: Option<PathBuf>,
    env: BTreeMap<String, String>,
    configure: Option<Step>,
    compile: Option<Step>,
    install: Option<Step>,
}

impl ManifestRecipe {
    pub fn parse(content: &str, origin: impl AsRef<Path>) -> Result<Self> {
        let file: ManifestFile = toml::from_str(content).map_err(|e| {
            BuildError::configuration(format!(
                "invalid recipe `{}`: {e}",
                origin.as_ref().display(),
            ))
        })?;

        Ok(Self {
            name: file.name,
            source: Source {
                uri: file.source,
                sha256: file.sha256,
            },
            dependencies: file.dependencies,
            buildable: file.buildable,
            root: file.root,
            env: file.env,
            configure: file.configure,
            compile: file.compile,
            install: file.install,
        })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            fs::read_to_string(path).context(format!("failed to read `{}`", path.display()))?;
        Self::parse(&content, path)
    }

    fn env(&self, ctx: &BuildContext) -> Result<Env> {
        let mut env: Env = vec![("PATH".into(), ctx.env_path()?)];
        env.extend(
            self.env
                .iter()
                .map(|(k, v)| (OsString::from(k), OsString::from(ctx.expand(v)))),
        );
        Ok(env)
    }

    fn run_step(&self, ctx: &BuildContext, phase: Phase, default_command: &str) -> Result<()> {
        let step = match phase {
            Phase::Configure => &self.configure,
            Phase::Compile => &self.compile,
            Phase::Install => &self.install,
            _ => &None,
        };
        let Some(step) = step else {
            return Err(BuildError::Programming {
                component: self.name.clone(),
                reason: format!("no `[{phase}]` step defined"),
            }
            .into());
        };

        let build_dir = sources_root(self, ctx)?.join("build");
        fs::create_dir_all(&build_dir).context("failed to create the build directory")?;

        let command = step.command.as_deref().unwrap_or(default_command);
        let args: Vec<String> = step.args.iter().map(|a| ctx.expand(a)).collect();

        ctx.run(&build_dir, &phase.to_string(), command, &args, &self.env(ctx)?)
    }
}

impl Recipe for ManifestRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn is_buildable(&self) -> bool {
        self.buildable
    }

    fn source_root(&self) -> Result<PathBuf> {
        match &self.root {
            Some(root) => Ok(root.clone()),
            None => default_source_root(&self.source),
        }
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        self.run_step(ctx, Phase::Configure, "../configure")
    }

    fn compile(&self, ctx: &BuildContext) -> Result<()> {
        self.run_step(ctx, Phase::Compile, "make")
    }

    fn install(&self, ctx: &BuildContext) -> Result<()> {
        self.run_step(ctx, Phase::Install, "make")
    }
}

/// Load every `*.toml` recipe in `dir`, in lexical filename order. A missing directory yields
/// no recipes.
pub fn load_dir(dir: impl AsRef<Path>) -> Result<Vec<ManifestRecipe>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        log::debug!("no recipes directory at {}", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).context(format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|e| e == "toml") {
            files.push(path);
        }
    }
    files.sort();

    files.iter().map(ManifestRecipe::load).collect()
}
