use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};

use crate::{
    commands::Env,
    context::BuildContext,
    packages::{base_env, run_configure_in, run_make_in},
    recipe::{Recipe, Source, sources_root},
};

pub const VERSION: &str = "13.2.0";
const SHA256: &str = "e275e76442a6067341a27f04c5c6b83d8613144004c0413528863dc6b5c743da";

const CFLAGS_FOR_TARGET: &str = "-g -Os -ffunction-sections -fdata-sections";

/// The GCC cross compiler (C and C++), with an extra "nano" build of libstdc++ compiled without
/// exceptions.
#[derive(Debug, Clone)]
pub struct Gcc {
    source: Source,
}

impl Default for Gcc {
    fn default() -> Self {
        Self {
            source: Source::new(
                format!("https://ftp.gnu.org/gnu/gcc/gcc-{VERSION}/gcc-{VERSION}.tar.xz"),
                SHA256,
            ),
        }
    }
}

impl Gcc {
    fn objdir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        Ok(sources_root(self, ctx)?.join("build"))
    }

    fn nano_objdir(&self, ctx: &BuildContext) -> Result<PathBuf> {
        Ok(sources_root(self, ctx)?.join("build-nano"))
    }

    fn env(&self, ctx: &BuildContext) -> Result<Env> {
        let mut env = base_env(ctx)?;
        env.push(("CFLAGS_FOR_TARGET".into(), CFLAGS_FOR_TARGET.into()));
        env.push(("CXXFLAGS_FOR_TARGET".into(), CFLAGS_FOR_TARGET.into()));
        Ok(env)
    }

    fn nano_env(&self, ctx: &BuildContext) -> Result<Env> {
        let mut env = base_env(ctx)?;
        env.push(("CFLAGS_FOR_TARGET".into(), CFLAGS_FOR_TARGET.into()));
        env.push((
            "CXXFLAGS_FOR_TARGET".into(),
            OsString::from(format!("{CFLAGS_FOR_TARGET} -fno-exceptions")),
        ));
        Ok(env)
    }

    fn configure_args(&self, ctx: &BuildContext) -> Vec<String> {
        let prefix = ctx.prefix.display();
        let target = &ctx.target;
        let mut args = vec![
            format!("--target={target}"),
            format!("--prefix={prefix}"),
            format!("--with-sysroot={prefix}/{target}"),
            "--with-native-system-header-dir=/include".into(),
            format!("--libexecdir={prefix}/{target}/lib"),
            "--enable-languages=c,c++".into(),
            "--enable-plugins".into(),
            "--disable-decimal-float".into(),
            "--disable-libffi".into(),
            "--disable-libstdcxx-pch".into(),
            "--disable-libgomp".into(),
            "--disable-libmudflap".into(),
            "--disable-libquadmath".into(),
            "--disable-libssp".into(),
            "--disable-nls".into(),
            "--enable-shared=libgcc".into(),
            "--disable-threads".into(),
            "--disable-tls".into(),
            "--with-gnu-ld".into(),
            "--with-gnu-as".into(),
            "--with-system-zlib".into(),
            "--with-newlib".into(),
            format!("--with-headers={prefix}/{target}/include"),
            format!("--with-python-dir=share/gcc-{target}"),
            "--with-isl".into(),
            "--with-libelf".into(),
            "--enable-gnu-indirect-function".into(),
            "--with-host-libstdc++=-static-libgcc -Wl,-Bstatic,-lstdc++,-Bdynamic -lm".into(),
            "--with-pkgversion=Toolsmith".into(),
        ];
        if target.starts_with("arm") {
            args.push("--with-multilib-list=rmprofile".into());
        }
        args
    }
}

impl Recipe for Gcc {
    fn name(&self) -> &str {
        "gcc"
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["newlib".into()]
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        let root = sources_root(self, ctx)?;
        let env = self.env(ctx)?;

        log::info!("   download prerequisites");
        ctx.run(
            &root,
            "download_prerequisites",
            root.join("contrib").join("download_prerequisites"),
            &[] as &[&str],
            &env,
        )?;

        let args = self.configure_args(ctx);
        run_configure_in(ctx, self.objdir(ctx)?, &args, &env)?;
        run_configure_in(ctx, self.nano_objdir(ctx)?, &args, &self.nano_env(ctx)?)
    }

    fn compile(&self, ctx: &BuildContext) -> Result<()> {
        let jobs = ctx.jobs.to_string();
        let args = [
            "-j",
            jobs.as_str(),
            "INHIBIT_LIBC_CFLAGS=-DUSE_TM_CLONE_REGISTRY=0",
        ];
        run_make_in(ctx, self.objdir(ctx)?, &args, &self.env(ctx)?)?;
        run_make_in(ctx, self.nano_objdir(ctx)?, &args, &self.nano_env(ctx)?)
    }

    fn install(&self, ctx: &BuildContext) -> Result<()> {
        run_make_in(ctx, self.objdir(ctx)?, &["install"], &self.env(ctx)?)?;

        log::info!("   install nano libraries");
        let nano = self.nano_objdir(ctx)?;
        let multilibs = ctx.capture(
            &nano,
            nano.join("gcc").join("gcc-cross"),
            &["-print-multi-lib"],
            &self.nano_env(ctx)?,
        )?;

        for multilib in parse_multilibs(&multilibs) {
            log::debug!("processing multilib {multilib}");
            install_nano_libraries(&nano, ctx, &multilib)?;
        }
        Ok(())
    }
}

/// Directories of the `-print-multi-lib` output, e.g. `thumb/v7-m/nofp;@mthumb@march=armv7-m`
/// yields `thumb/v7-m/nofp`. The default multilib is `.`.
pub fn parse_multilibs(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| line.split(';').next())
        .map(str::trim)
        .filter(|dir| !dir.is_empty())
        .map(String::from)
        .collect()
}

/// Copy the nano `libstdc++.a` and `libsupc++.a` of one multilib next to the regular ones as
/// `libstdc++_nano.a` and `libsupc++_nano.a`.
fn install_nano_libraries(nano_objdir: &Path, ctx: &BuildContext, multilib: &str) -> Result<()> {
    let libstdcxx = nano_objdir
        .join(&ctx.target)
        .join(multilib)
        .join("libstdc++-v3");
    let dest = ctx.sysroot().join("lib").join(multilib);

    let libraries = [
        (
            libstdcxx.join("src").join(".libs").join("libstdc++.a"),
            "libstdc++_nano.a",
        ),
        (
            libstdcxx.join("libsupc++").join(".libs").join("libsupc++.a"),
            "libsupc++_nano.a",
        ),
    ];

    for (source, name) in libraries {
        if !source.exists() {
            bail!("{} was not built", source.display());
        }
        std::fs::create_dir_all(&dest).context(format!("creating {}", dest.display()))?;
        log::debug!("copying {} to {}", source.display(), dest.join(name).display());
        std::fs::copy(&source, dest.join(name))
            .context(format!("copying {}", source.display()))?;
    }
    Ok(())
}

