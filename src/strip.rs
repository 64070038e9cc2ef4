use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use walkdir::WalkDir;

use crate::context::BuildContext;

/// Strip the toolchain's host executables and drop the GCC plugin library, which is only needed
/// to build GCC plugins.
pub fn strip_toolchain(ctx: &BuildContext) -> Result<()> {
    let bin = ctx.bin_dir();
    if bin.is_dir() {
        log::info!("=> stripping {}", bin.display());
        for executable in executables(&bin)? {
            let file = executable
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            ctx.run(&bin, "strip", "strip", &[&executable], &Vec::new())
                .context(format!("stripping {file}"))?;
        }
    }

    let lib = ctx.prefix.join("lib");
    for path in matching_files(&lib, "libcc1")? {
        log::info!("removing {}", path.display());
        fs::remove_file(&path).context(format!("removing {}", path.display()))?;
    }

    Ok(())
}

/// Regular files with an executable bit directly inside `dir`.
pub fn executables(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let mode = entry.metadata()?.permissions().mode();
        if mode & 0o111 != 0 {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}

/// Files directly inside `dir` whose name starts with `prefix`. A missing directory has none.
pub fn matching_files(
    dir: impl AsRef<Path>,
    prefix: impl AsRef<str>,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        let matches = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.starts_with(prefix.as_ref()));
        if matches && !entry.file_type().is_dir() {
            out.push(entry.into_path());
        }
    }
    out.sort();
    Ok(out)
}
