//! `toolsmith.toml` parsing and handling.
//!
//! The current working directory is checked for a `toolsmith.toml` first, falling back to the
//! global configuration file in the user's configuration directory. Only one of them is used: a
//! local file takes precedence over the global one as a whole. Command line flags override
//! whatever the file says.
//!
//! # Example configuration
//! ```toml
//! build_dir = "build"
//! output_dir = "build/output"
//! target = "arm-none-eabi"
//! jobs = 8
//! components = "binutils,gcc"
//! ```
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    context::{BuildContext, default_jobs},
    error::BuildError,
    registry::Selection,
};

pub const CONFIG_FILE: &str = "toolsmith.toml";

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub build_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub patches_dir: Option<PathBuf>,
    pub recipes_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub jobs: Option<u64>,
    pub components: Option<String>,
    pub strip: Option<bool>,
}

/// Load configuration in `filepath`.
pub fn load_config(filepath: impl AsRef<Path>) -> Result<Option<Config>> {
    if !filepath.as_ref().exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(&filepath).context(format!(
        "failed to read file at `{}`",
        filepath.as_ref().display()
    ))?;

    let config = toml::from_str(content.as_str()).map_err(|e| {
        BuildError::configuration(format!(
            "failed to parse TOML in `{}`: {e}",
            filepath.as_ref().display()
        ))
    })?;
    Ok(Some(config))
}

pub fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_FILE))
}

/// Where the configuration came from.
#[derive(Debug, PartialEq, Eq)]
pub enum ConfigSource {
    Local(Config),
    Global(Config),
    Default,
}

impl From<ConfigSource> for Config {
    fn from(value: ConfigSource) -> Self {
        match value {
            ConfigSource::Local(c) | ConfigSource::Global(c) => c,
            ConfigSource::Default => Config::default(),
        }
    }
}

/// Returns the configuration in effect.
///
/// Precedence:
/// - `toolsmith.toml` in the current working directory
/// - the global `toolsmith.toml`
/// - defaults
pub fn resolve_config() -> Result<ConfigSource> {
    if let Some(local) = load_config(Path::new(CONFIG_FILE))? {
        return Ok(ConfigSource::Local(local));
    }
    log::debug!("no `{CONFIG_FILE}` detected in current directory. Using the global configuration");

    if let Some(path) = global_config_path()
        && let Some(global) = load_config(&path)?
    {
        return Ok(ConfigSource::Global(global));
    }
    Ok(ConfigSource::Default)
}

/// Values given on the command line. `None` means the flag wasn't passed.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub build_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub patches_dir: Option<PathBuf>,
    pub recipes_dir: Option<PathBuf>,
    pub target: Option<String>,
    pub jobs: Option<u64>,
    pub components: Option<String>,
    pub no_verify: bool,
    pub no_strip: bool,
}

/// Fully resolved settings of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub build_dir: PathBuf,
    pub output_dir: PathBuf,
    pub patches_dir: PathBuf,
    pub recipes_dir: PathBuf,
    pub target: String,
    pub jobs: u64,
    pub selection: Selection,
    pub skip_verification: bool,
    pub strip: bool,
}

impl Settings {
    /// Merge command line `overrides` over `config` over defaults.
    pub fn resolve(config: Config, overrides: Overrides) -> Result<Self> {
        let components = overrides
            .components
            .or(config.components)
            .unwrap_or_else(|| "all".into());

        let jobs = overrides.jobs.or(config.jobs).unwrap_or_else(default_jobs);
        if jobs == 0 {
            return Err(BuildError::configuration("`jobs` must be at least 1").into());
        }

        Ok(Self {
            build_dir: overrides
                .build_dir
                .or(config.build_dir)
                .unwrap_or_else(|| "build".into()),
            output_dir: overrides
                .output_dir
                .or(config.output_dir)
                .unwrap_or_else(|| PathBuf::from("build").join("output")),
            patches_dir: overrides
                .patches_dir
                .or(config.patches_dir)
                .unwrap_or_else(|| "patches".into()),
            recipes_dir: overrides
                .recipes_dir
                .or(config.recipes_dir)
                .unwrap_or_else(|| "recipes".into()),
            target: overrides
                .target
                .or(config.target)
                .unwrap_or_else(|| "arm-none-eabi".into()),
            jobs,
            selection: components.parse()?,
            skip_verification: overrides.no_verify,
            strip: !overrides.no_strip && config.strip.unwrap_or(true),
        })
    }

    /// Build context for these settings. Directories are made absolute because build tools run
    /// from inside the source trees.
    pub fn context(&self) -> Result<BuildContext> {
        let absolute = |path: &Path| {
            std::path::absolute(path).context(format!("resolving {}", path.display()))
        };

        let mut ctx = BuildContext::new(absolute(&self.build_dir)?, absolute(&self.output_dir)?);
        ctx.patches_dir = self.patches_dir.clone();
        ctx.target = self.target.clone();
        ctx.jobs = self.jobs;
        ctx.skip_verification = self.skip_verification;
        Ok(ctx)
    }
}
