//! Built-in recipes for a bare-metal toolchain.

pub mod binutils;
pub mod gcc;
pub mod newlib;

use std::{ffi::OsStr, path::Path};

use anyhow::{Context, Result};

use crate::{commands::Env, context::BuildContext};

/// Run `../configure` from an out-of-tree build directory.
pub fn run_configure_in(
    ctx: &BuildContext,
    objdir: impl AsRef<Path>,
    args: &[impl AsRef<OsStr>],
    env: &Env,
) -> Result<()> {
    let objdir = objdir.as_ref();
    std::fs::create_dir_all(objdir).context("failed to create an objdir")?;
    let configure = objdir
        .parent()
        .context(format!("{} has no parent", objdir.display()))?
        .join("configure");
    ctx.run(objdir, "configure", configure, args, env)
}

pub fn run_make_in(
    ctx: &BuildContext,
    objdir: impl AsRef<Path>,
    args: &[impl AsRef<OsStr>],
    env: &Env,
) -> Result<()> {
    ctx.run(objdir, "make", "make", args, env)
}

/// Base environment for build steps: the toolchain's bin directory in front of `PATH`.
pub fn base_env(ctx: &BuildContext) -> Result<Env> {
    Ok(vec![("PATH".into(), ctx.env_path()?)])
}
