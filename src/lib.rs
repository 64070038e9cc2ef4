use anyhow::Result;

use crate::{
    config::Settings,
    orchestrator::{Orchestrator, Report},
    registry::{Registry, select},
    strip::strip_toolchain,
};

pub mod checksum;
pub mod commands;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod packages;
pub mod patch;
pub mod recipe;
pub mod registry;
pub mod strip;

/// The built-in recipes plus whatever is defined in the settings' recipes directory.
pub fn load_registry(settings: &Settings) -> Result<Registry> {
    let mut registry = Registry::builtin();
    registry.discover(&settings.recipes_dir)?;
    Ok(registry)
}

/// Build the selected components and everything they depend on, then strip the result.
pub fn build_toolchain(settings: &Settings) -> Result<Report> {
    let registry = load_registry(settings)?;
    let requested = select(&registry.names(), &settings.selection)?;
    let ctx = settings.context()?;

    log::info!("Build options:");
    log::info!("  build dir  : {}", ctx.build_dir.display());
    log::info!("  output dir : {}", ctx.prefix.display());
    log::info!("  patches dir: {}", ctx.patches_dir.display());
    log::info!("  target     : {}", ctx.target);
    log::info!("  jobs       : {}", ctx.jobs);
    log::info!("  components : {}", requested.join(", "));
    if ctx.skip_verification {
        log::warn!("SHA256 verification is disabled");
    }
    log::info!("");

    let report = Orchestrator::new(&registry, &ctx).run(&requested)?;

    if settings.strip {
        strip_toolchain(&ctx)?;
    }

    log::info!("");
    log::info!("export PATH=\"{}:$PATH\"", ctx.bin_dir().display());
    Ok(report)
}
