use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::commands::{Env, capture_command_in, run_command_in};

/// Everything a recipe needs to know about the current run.
///
/// ```text
/// <build_dir>/
///   sources/download/   cached archives
///   sources/<name>/     unpacked sources, one directory per recipe
///   logs/               subprocess output
///   <name>_done         completion markers
/// ```
#[derive(Debug, Clone)]
pub struct BuildContext {
    /// Shared build/output root. Holds sources, logs and completion markers.
    pub build_dir: PathBuf,
    /// Install prefix of the toolchain.
    pub prefix: PathBuf,
    /// Root of the per-component patch directories.
    pub patches_dir: PathBuf,
    /// Target triple, e.g. `arm-none-eabi`.
    pub target: String,
    pub jobs: u64,
    /// Accept cached and fetched archives without checking their digest.
    pub skip_verification: bool,
}

impl BuildContext {
    pub fn new(build_dir: impl Into<PathBuf>, prefix: impl Into<PathBuf>) -> Self {
        Self {
            build_dir: build_dir.into(),
            prefix: prefix.into(),
            patches_dir: PathBuf::from("patches"),
            target: "arm-none-eabi".into(),
            jobs: default_jobs(),
            skip_verification: false,
        }
    }

    pub fn sources_dir(&self) -> PathBuf {
        self.build_dir.join("sources")
    }

    /// Where a recipe's archive is unpacked.
    pub fn source_dir(&self, name: impl AsRef<str>) -> PathBuf {
        self.sources_dir().join(name.as_ref())
    }

    pub fn download_dir(&self) -> Result<PathBuf> {
        let dir = self.sources_dir().join("download");
        fs::create_dir_all(&dir).context(format!("creating {}", dir.display()))?;
        Ok(dir)
    }

    pub fn logs_dir(&self) -> Result<PathBuf> {
        let dir = self.build_dir.join("logs");
        fs::create_dir_all(&dir).context(format!("creating {}", dir.display()))?;
        Ok(dir)
    }

    /// `<prefix>/<target>`, the sysroot of the cross toolchain.
    pub fn sysroot(&self) -> PathBuf {
        self.prefix.join(&self.target)
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.prefix.join("bin")
    }

    /// `PATH` with the toolchain's bin directory in front.
    pub fn env_path(&self) -> Result<OsString> {
        let mut paths = vec![self.bin_dir()];
        if let Some(path) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&path));
        }
        std::env::join_paths(paths).context("joining PATH")
    }

    /// Marker recording that the recipe `name` was built and installed.
    pub fn done_marker(&self, name: impl AsRef<str>) -> PathBuf {
        self.build_dir.join(format!("{}_done", name.as_ref()))
    }

    /// Marker recording that the patch file `patch` was applied.
    pub fn patch_marker(&self, patch: impl AsRef<Path>) -> PathBuf {
        let base = patch
            .as_ref()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.build_dir.join(format!("{base}_patch_done"))
    }

    /// Run a build-tool invocation, logging its output under [`BuildContext::logs_dir`].
    pub fn run(
        &self,
        workdir: impl AsRef<Path>,
        title: &str,
        command: impl AsRef<std::ffi::OsStr>,
        args: &[impl AsRef<std::ffi::OsStr>],
        env: &Env,
    ) -> Result<()> {
        run_command_in(self.logs_dir()?, workdir, title, command, args, env)
    }

    /// Run a command and return its standard output.
    pub fn capture(
        &self,
        workdir: impl AsRef<Path>,
        command: impl AsRef<std::ffi::OsStr>,
        args: &[impl AsRef<std::ffi::OsStr>],
        env: &Env,
    ) -> Result<String> {
        capture_command_in(workdir, command, args, env)
    }

    /// Expand `{prefix}`, `{target}`, `{sysroot}` and `{jobs}` in a recipe argument.
    pub fn expand(&self, value: &str) -> String {
        value
            .replace("{prefix}", &self.prefix.display().to_string())
            .replace("{sysroot}", &self.sysroot().display().to_string())
            .replace("{target}", &self.target)
            .replace("{jobs}", &self.jobs.to_string())
    }
}

pub fn default_jobs() -> u64 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u64)
        .unwrap_or(1)
}
