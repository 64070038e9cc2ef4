use std::path::Path;

use anyhow::Result;
use toolsmith::{
    context::BuildContext,
    error::{BuildError, kind_of},
    patch::{apply_all, apply_patch, patch_files},
};

const FIX_GREETING: &str = "\
diff --git a/hello.txt b/hello.txt
--- a/hello.txt
+++ b/hello.txt
@@ -1,3 +1,3 @@
 line one
-hello world
+hello toolchain
 line three
--- /dev/null
+++ b/NEWS
@@ -0,0 +1,1 @@
+patched
";

const BROKEN: &str = "\
--- a/hello.txt
+++ b/hello.txt
@@ -1,1 +1,1 @@
-goodbye
+hello
--- a/other.txt
+++ b/other.txt
@@ -1 +1 @@
-this does not match
+new
";

fn setup(root: &Path) -> Result<(BuildContext, std::path::PathBuf)> {
    let mut ctx = BuildContext::new(root.join("build"), root.join("prefix"));
    ctx.patches_dir = root.join("patches");

    let source = root.join("src");
    std::fs::create_dir_all(&source)?;
    std::fs::write(source.join("hello.txt"), "line one\nhello world\nline three\n")?;
    std::fs::write(source.join("other.txt"), "unrelated\n")?;
    Ok((ctx, source))
}

#[test]
fn test_missing_patch_dir_is_a_noop() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (ctx, source) = setup(root.path())?;

    assert!(patch_files(&ctx.patches_dir, "demo")?.is_empty());
    assert!(apply_all(&ctx, "demo", &source)?.is_empty());
    Ok(())
}

#[test]
fn test_patches_are_ordered_by_name() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let dir = root.path().join("demo");
    std::fs::create_dir_all(&dir)?;
    for name in ["0002-b.patch", "0001-a.diff", "README", "0010-c.patch"] {
        std::fs::write(dir.join(name), "")?;
    }

    let names: Vec<String> = patch_files(root.path(), "demo")?
        .iter()
        .filter_map(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, ["0001-a.diff", "0002-b.patch", "0010-c.patch"]);
    Ok(())
}

#[test]
fn test_patch_is_applied_once() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (ctx, source) = setup(root.path())?;
    let patches = ctx.patches_dir.join("demo");
    std::fs::create_dir_all(&patches)?;
    std::fs::write(patches.join("0001-greeting.patch"), FIX_GREETING)?;

    let applied = apply_all(&ctx, "demo", &source)?;
    assert_eq!(applied.len(), 1);
    assert!(ctx.patch_marker("0001-greeting.patch").exists());
    similar_asserts::assert_eq!(
        std::fs::read_to_string(source.join("hello.txt"))?,
        "line one\nhello toolchain\nline three\n"
    );
    similar_asserts::assert_eq!(std::fs::read_to_string(source.join("NEWS"))?, "patched\n");

    // applying the same patch again would fail, the marker prevents it
    assert!(apply_all(&ctx, "demo", &source)?.is_empty());
    similar_asserts::assert_eq!(
        std::fs::read_to_string(source.join("hello.txt"))?,
        "line one\nhello toolchain\nline three\n"
    );
    Ok(())
}

#[test]
fn test_failing_patch_leaves_tree_untouched() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (ctx, source) = setup(root.path())?;
    let patches = ctx.patches_dir.join("demo");
    std::fs::create_dir_all(&patches)?;
    std::fs::write(patches.join("0001-broken.patch"), BROKEN)?;

    let err = apply_all(&ctx, "demo", &source).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Patch { .. })));
    assert!(!ctx.patch_marker("0001-broken.patch").exists());
    similar_asserts::assert_eq!(
        std::fs::read_to_string(source.join("hello.txt"))?,
        "line one\nhello world\nline three\n"
    );
    similar_asserts::assert_eq!(
        std::fs::read_to_string(source.join("other.txt"))?,
        "unrelated\n"
    );
    Ok(())
}

#[test]
fn test_patch_deleting_a_file() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (_ctx, source) = setup(root.path())?;
    let patch = root.path().join("remove.patch");
    std::fs::write(
        &patch,
        "--- a/other.txt\n+++ /dev/null\n@@ -1 +0,0 @@\n-unrelated\n",
    )?;

    apply_patch(&patch, &source)?;
    assert!(!source.join("other.txt").exists());
    assert!(source.join("hello.txt").exists());
    Ok(())
}

#[test]
fn test_patch_on_non_utf8_file() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (_ctx, source) = setup(root.path())?;
    std::fs::write(source.join("ChangeLog"), b"Author: Ren\xe9\nold line\n")?;
    let patch = root.path().join("changelog.patch");
    std::fs::write(
        &patch,
        b"--- a/ChangeLog\n+++ b/ChangeLog\n@@ -1,2 +1,2 @@\n Author: Ren\xe9\n-old line\n+new line\n",
    )?;

    apply_patch(&patch, &source)?;
    assert_eq!(
        std::fs::read(source.join("ChangeLog"))?,
        b"Author: Ren\xe9\nnew line\n"
    );
    Ok(())
}

#[test]
fn test_git_rename_is_rejected_without_marker() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (ctx, source) = setup(root.path())?;
    let patches = ctx.patches_dir.join("demo");
    std::fs::create_dir_all(&patches)?;
    std::fs::write(
        patches.join("0001-rename.patch"),
        format!(
            "diff --git a/other.txt b/renamed.txt\nsimilarity index 100%\nrename from other.txt\nrename to renamed.txt\n{FIX_GREETING}"
        ),
    )?;

    let err = apply_all(&ctx, "demo", &source).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Patch { .. })));
    assert!(!ctx.patch_marker("0001-rename.patch").exists());
    // the applicable part is not applied either
    similar_asserts::assert_eq!(
        std::fs::read_to_string(source.join("hello.txt"))?,
        "line one\nhello world\nline three\n"
    );
    Ok(())
}

#[test]
fn test_unreadable_patch_is_a_patch_error() -> Result<()> {
    let root = tempfile::TempDir::new()?;
    let (_ctx, source) = setup(root.path())?;

    let err = apply_patch(root.path().join("missing.patch"), &source).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Patch { .. })));
    Ok(())
}
