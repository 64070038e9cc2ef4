use std::path::PathBuf;

use anyhow::Result;

use crate::{
    context::BuildContext,
    packages::{base_env, run_configure_in, run_make_in},
    recipe::{Recipe, Source, sources_root},
};

pub const VERSION: &str = "2.42";
const SHA256: &str = "f6e4d41fd5fc778b06b7891457b3620da5ecea1006c6a4a41ae998109f85a800";

/// GNU assembler, linker and binary utilities.
#[derive(Debug, Clone)]
pub struct Binutils {
    source: Source,
}

impl Default for Binutils {
    fn default() -> Self {
        Self {
            source: Source::new(
                format!("https://ftp.gnu.org/gnu/binutils/binutils-{VERSION}.tar.xz"),
                SHA256,
            ),
        }
    }
}

impl Binutils {
    fn objdir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        Ok(sources_root(self, ctx)?.join("build"))
    }
}

impl Recipe for Binutils {
    fn name(&self) -> &str {
        "binutils"
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        let objdir = self.objdir(ctx)?;
        log::info!("   configure {}", objdir.display());

        let args = [
            format!("--target={}", ctx.target),
            format!("--prefix={}", ctx.prefix.display()),
            format!("--with-sysroot={}", ctx.sysroot().display()),
            "--enable-multilib".into(),
            "--enable-interwork".into(),
            "--with-gnu-as".into(),
            "--with-gnu-ld".into(),
            "--disable-nls".into(),
            "--enable-ld=default".into(),
            "--enable-gold".into(),
            "--enable-plugins".into(),
            "--enable-deterministic-archives".into(),
        ];
        run_configure_in(ctx, &objdir, &args, &base_env(ctx)?)
    }

    fn compile(&self, ctx: &BuildContext) -> Result<()> {
        let jobs = ctx.jobs.to_string();
        run_make_in(ctx, self.objdir(ctx)?, &["-j", jobs.as_str()], &base_env(ctx)?)
    }

    fn install(&self, ctx: &BuildContext) -> Result<()> {
        run_make_in(ctx, self.objdir(ctx)?, &["install"], &base_env(ctx)?)
    }
}
