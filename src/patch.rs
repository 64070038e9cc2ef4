//! Applying a component's patch set.
//!
//! Patches live in `<patches_dir>/<component>/` and are applied in lexical filename order. Each
//! successful application leaves a `<patch>_patch_done` marker, so a patch is never applied
//! twice, even across runs.
use std::{
    collections::BTreeMap,
    fs::{self, File},
    path::{Component, Path, PathBuf},
};

use anyhow::{Context, Result};

use crate::{context::BuildContext, error::BuildError};

const DEV_NULL: &str = "/dev/null";

/// Patch files for `component`, in application order. A missing directory yields none.
pub fn patch_files(patches_dir: impl AsRef<Path>, component: impl AsRef<str>) -> Result<Vec<PathBuf>> {
    let dir = patches_dir.as_ref().join(component.as_ref());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut patches = Vec::new();
    for entry in fs::read_dir(&dir).context(format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_patch = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("patch") | Some("diff")
        );
        if path.is_file() && is_patch {
            patches.push(path);
        }
    }
    patches.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(patches)
}

/// Apply every pending patch of `component` to `source_dir`.
///
/// Returns the patches applied by this call.
pub fn apply_all(
    ctx: &BuildContext,
    component: impl AsRef<str>,
    source_dir: impl AsRef<Path>,
) -> Result<Vec<PathBuf>> {
    let component = component.as_ref();
    let source_dir = source_dir.as_ref();
    let mut applied = Vec::new();

    for patch in patch_files(&ctx.patches_dir, component)? {
        let marker = ctx.patch_marker(&patch);
        if marker.exists() {
            log::debug!("{} already applied", patch.display());
            continue;
        }

        log::info!("=> applying {}", patch.display());
        apply_patch(&patch, source_dir)?;
        fs::create_dir_all(&ctx.build_dir)?;
        File::create(&marker).context(format!("creating {}", marker.display()))?;
        applied.push(patch);
    }

    Ok(applied)
}

/// Apply a unified diff with strip level 1.
///
/// Every file section is computed before anything is written, so a patch that doesn't apply
/// leaves the tree untouched.
pub fn apply_patch(patch: impl AsRef<Path>, source_dir: impl AsRef<Path>) -> Result<()> {
    let patch = patch.as_ref();
    let source_dir = source_dir.as_ref();
    let fail = |reason: String| BuildError::Patch {
        patch: patch.to_path_buf(),
        reason,
    };

    let bytes =
        fs::read(patch).map_err(|e| fail(format!("reading {}: {e}", patch.display())))?;
    let sections = split_file_sections(&bytes).map_err(fail)?;
    if sections.is_empty() {
        return Err(fail("no file sections found".into()).into());
    }

    // None means the file is deleted
    let mut results: BTreeMap<PathBuf, Option<Vec<u8>>> = BTreeMap::new();

    for section in &sections {
        let parsed = diffy::Patch::from_bytes(section).map_err(|e| fail(e.to_string()))?;

        let original = parsed.original().map(clean_filename);
        let modified = parsed.modified().map(clean_filename);

        let target = match (&original, &modified) {
            (_, Some(m)) if m != DEV_NULL => m.clone(),
            (Some(o), _) if o != DEV_NULL => o.clone(),
            _ => return Err(fail("section without a file name".into()).into()),
        };
        let relative = strip_components(&target, 1)
            .ok_or_else(|| fail(format!("`{target}` escapes the source tree")))?;
        let path = source_dir.join(&relative);

        let base = match results.get(&path) {
            Some(Some(content)) => content.clone(),
            Some(None) => Vec::new(),
            None if original.as_deref() == Some(DEV_NULL) => Vec::new(),
            None => fs::read(&path)
                .map_err(|e| fail(format!("reading {}: {e}", path.display())))?,
        };

        let patched = diffy::apply_bytes(&base, &parsed)
            .map_err(|e| fail(format!("{}: {e}", relative.display())))?;

        if modified.as_deref() == Some(DEV_NULL) {
            results.insert(path, None);
        } else {
            results.insert(path, Some(patched));
        }
    }

    for (path, content) in results {
        match content {
            Some(content) => {
                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::write(&path, content).context(format!("writing {}", path.display()))?;
            }
            None => {
                if path.exists() {
                    fs::remove_file(&path).context(format!("removing {}", path.display()))?;
                }
            }
        }
    }

    Ok(())
}

/// `a/foo.c\t2024-01-01` -> `a/foo.c`
fn clean_filename(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.split('\t').next().unwrap_or(&name).trim().to_string()
}

/// Drop `n` leading components, refusing anything that would leave the tree.
fn strip_components(path: &str, n: usize) -> Option<PathBuf> {
    let components: Vec<Component> = Path::new(path).components().collect();
    let rest = if components.len() > n {
        &components[n..]
    } else {
        &components[..]
    };

    let mut out = PathBuf::new();
    for c in rest {
        match c {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Split a (possibly multi-file) unified diff into one section per file.
///
/// Hunk line counts are tracked so a removed line starting with `--` is not mistaken for the
/// next file header. Preamble lines (`diff --git`, `index ...`) are dropped. A git section without
/// `---`/`+++` headers (rename, mode change, binary) can't be applied and is an error.
pub fn split_file_sections(text: &[u8]) -> std::result::Result<Vec<Vec<u8>>, String> {
    let lines: Vec<&[u8]> = text.split_inclusive(|&b| b == b'\n').collect();
    let unsupported = |header: &[u8]| {
        format!(
            "`{}` has no text hunks (rename, mode change or binary)",
            String::from_utf8_lossy(header).trim()
        )
    };

    let mut sections = Vec::new();
    let mut git_header: Option<&[u8]> = None;
    let mut i = 0;

    while i < lines.len() {
        if lines[i].starts_with(b"diff --git ") {
            if let Some(header) = git_header {
                return Err(unsupported(header));
            }
            git_header = Some(lines[i]);
            i += 1;
            continue;
        }

        let is_header = lines[i].starts_with(b"--- ")
            && lines.get(i + 1).is_some_and(|l| l.starts_with(b"+++ "));
        if !is_header {
            i += 1;
            continue;
        }

        git_header = None;
        let start = i;
        i += 2;
        while i < lines.len() && lines[i].starts_with(b"@@") {
            let (mut old, mut new) = hunk_counts(&String::from_utf8_lossy(lines[i]));
            i += 1;
            while (old > 0 || new > 0) && i < lines.len() {
                match lines[i].first() {
                    Some(b'-') => old = old.saturating_sub(1),
                    Some(b'+') => new = new.saturating_sub(1),
                    Some(b'\\') => {}
                    _ => {
                        old = old.saturating_sub(1);
                        new = new.saturating_sub(1);
                    }
                }
                i += 1;
            }
            while i < lines.len() && lines[i].starts_with(b"\\") {
                i += 1;
            }
        }
        sections.push(lines[start..i].concat());
    }

    if let Some(header) = git_header {
        return Err(unsupported(header));
    }
    Ok(sections)
}

/// `@@ -1,7 +1,8 @@` -> `(7, 8)`. An omitted count means one line.
fn hunk_counts(header: &str) -> (usize, usize) {
    let mut old = 1;
    let mut new = 1;
    for part in header.split_whitespace().skip(1).take(2) {
        let count = |range: &str| {
            range
                .split_once(',')
                .map(|(_, c)| c.parse().unwrap_or(0))
                .unwrap_or(1)
        };
        if let Some(range) = part.strip_prefix('-') {
            old = count(range);
        } else if let Some(range) = part.strip_prefix('+') {
            new = count(range);
        }
    }
    (old, new)
}
