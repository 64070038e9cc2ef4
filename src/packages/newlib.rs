use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::{
    commands::Env,
    context::BuildContext,
    packages::{base_env, run_configure_in, run_make_in},
    recipe::{Recipe, Source, sources_root},
};

pub const VERSION: &str = "4.4.0.20231231";
const SHA256: &str = "0c166a39e1bf0951dfafcd68949fe0e4b6d3658081d6282f39aeefc6310f2f13";

const CFLAGS_FOR_TARGET: &str = "-g -Os -ffunction-sections -fdata-sections";

/// Libraries that exist in both the nano and the full flavour of newlib.
const NANO_LIBRARIES: [&str; 3] = ["libc.a", "libg.a", "librdimon.a"];

/// The newlib C library, built twice: a size-optimised "nano" flavour and a full one.
#[derive(Debug, Clone)]
pub struct Newlib {
    source: Source,
}

impl Default for Newlib {
    fn default() -> Self {
        Self {
            source: Source::new(
                format!("https://sourceware.org/pub/newlib/newlib-{VERSION}.tar.gz"),
                SHA256,
            ),
        }
    }
}

impl Newlib {
    fn nano_dir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        Ok(sources_root(self, ctx)?.join("build-nano"))
    }

    fn full_dir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        Ok(sources_root(self, ctx)?.join("build-full"))
    }

    fn env(&self, ctx: &BuildContext) -> Result<Env> {
        let mut env = base_env(ctx)?;
        env.push(("CFLAGS_FOR_TARGET".into(), OsString::from(CFLAGS_FOR_TARGET)));
        Ok(env)
    }
}

impl Recipe for Newlib {
    fn name(&self) -> &str {
        "newlib"
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["binutils".into()]
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        let env = self.env(ctx)?;
        let common = [
            format!("--target={}", ctx.target),
            format!("--prefix={}", ctx.prefix.display()),
            "--disable-newlib-supplied-syscalls".into(),
            "--enable-newlib-retargetable-locking".into(),
            "--disable-nls".into(),
        ];

        let mut nano = common.to_vec();
        nano.extend(
            [
                "--enable-newlib-reent-small",
                "--disable-newlib-fvwrite-in-streamio",
                "--disable-newlib-fseek-optimization",
                "--disable-newlib-wide-orient",
                "--enable-newlib-nano-malloc",
                "--disable-newlib-unbuf-stream-opt",
                "--enable-lite-exit",
                "--enable-newlib-global-atexit",
                "--enable-newlib-nano-formatted-io",
            ]
            .map(String::from),
        );
        run_configure_in(ctx, self.nano_dir(ctx)?, &nano, &env)?;

        let mut full = common.to_vec();
        full.extend(
            [
                "--enable-newlib-io-long-long",
                "--enable-newlib-io-c99-formats",
                "--enable-newlib-register-fini",
            ]
            .map(String::from),
        );
        run_configure_in(ctx, self.full_dir(ctx)?, &full, &env)
    }

    fn compile(&self, ctx: &BuildContext) -> Result<()> {
        let env = self.env(ctx)?;
        let jobs = ctx.jobs.to_string();
        run_make_in(ctx, self.nano_dir(ctx)?, &["-j", jobs.as_str()], &env)?;
        run_make_in(ctx, self.full_dir(ctx)?, &["-j", jobs.as_str()], &env)
    }

    fn install(&self, ctx: &BuildContext) -> Result<()> {
        let env = self.env(ctx)?;
        run_make_in(ctx, self.nano_dir(ctx)?, &["install"], &env)?;

        log::info!("   rename libraries to nano");
        for renamed in rename_nano_libraries(&ctx.prefix)? {
            log::debug!("{}", renamed.display());
        }

        run_make_in(ctx, self.full_dir(ctx)?, &["install"], &env)
    }
}

/// `libc.a` -> `libc_nano.a`, for every nano library found under `root`.
///
/// Returns the new paths.
pub fn rename_nano_libraries(root: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(root.as_ref()) {
        let entry = entry?;
        let is_nano_lib = entry
            .file_name()
            .to_str()
            .is_some_and(|name| NANO_LIBRARIES.contains(&name));
        if is_nano_lib && entry.file_type().is_file() {
            found.push(entry.into_path());
        }
    }

    let mut renamed = Vec::with_capacity(found.len());
    for path in found {
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = path.with_file_name(format!("{stem}_nano.a"));
        std::fs::rename(&path, &target).context(format!("renaming {}", path.display()))?;
        renamed.push(target);
    }
    Ok(renamed)
}
