mod common;

use std::{cell::RefCell, rc::Rc};

use anyhow::{Result, bail};
use common::{file_uri, make_archive};
use toolsmith::{
    context::BuildContext,
    error::{BuildError, Phase, kind_of},
    manifest::ManifestRecipe,
    orchestrator::Orchestrator,
    recipe::{Recipe, Source, sources_root},
    registry::Registry,
};

type Journal = Rc<RefCell<Vec<String>>>;

/// A recipe that records its phases instead of running a build system.
struct Mock {
    name: String,
    source: Source,
    dependencies: Vec<String>,
    fail_in: Option<Phase>,
    journal: Journal,
    /// README contents as seen by `configure`.
    seen: Journal,
}

impl Mock {
    fn record(&self, phase: Phase) -> Result<()> {
        self.journal
            .borrow_mut()
            .push(format!("{}:{phase}", self.name));
        if self.fail_in == Some(phase) {
            bail!("make: *** [all] Error 2");
        }
        Ok(())
    }
}

impl Recipe for Mock {
    fn name(&self) -> &str {
        &self.name
    }

    fn source(&self) -> &Source {
        &self.source
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn configure(&self, ctx: &BuildContext) -> Result<()> {
        let readme = sources_root(self, ctx)?.join("README");
        self.seen.borrow_mut().push(std::fs::read_to_string(readme)?);
        self.record(Phase::Configure)
    }

    fn compile(&self, _ctx: &BuildContext) -> Result<()> {
        self.record(Phase::Compile)
    }

    fn install(&self, _ctx: &BuildContext) -> Result<()> {
        self.record(Phase::Install)
    }
}

struct Fixture {
    root: tempfile::TempDir,
    ctx: BuildContext,
    registry: Registry,
    journal: Journal,
    seen: Journal,
}

impl Fixture {
    fn new() -> Result<Self> {
        let root = tempfile::TempDir::new()?;
        std::fs::create_dir_all(root.path().join("mirror"))?;
        let mut ctx = BuildContext::new(root.path().join("build"), root.path().join("prefix"));
        ctx.patches_dir = root.path().join("patches");
        Ok(Self {
            root,
            ctx,
            registry: Registry::new(),
            journal: Journal::default(),
            seen: Journal::default(),
        })
    }

    fn archive_uri(&self, name: &str) -> Result<String> {
        self.archive_with(name, name)
    }

    fn archive_with(&self, name: &str, readme: &str) -> Result<String> {
        let archive = make_archive(
            &self.root.path().join("mirror"),
            &format!("{name}-1.0"),
            &[("README", readme)],
        )?;
        Ok(file_uri(&archive))
    }

    fn add(&mut self, name: &str, dependencies: &[&str], fail_in: Option<Phase>) -> Result<()> {
        let source = Source::unverified(self.archive_uri(name)?);
        self.add_source(name, source, dependencies, fail_in)
    }

    fn add_source(
        &mut self,
        name: &str,
        source: Source,
        dependencies: &[&str],
        fail_in: Option<Phase>,
    ) -> Result<()> {
        let mock = Mock {
            name: name.into(),
            source,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            fail_in,
            journal: self.journal.clone(),
            seen: self.seen.clone(),
        };
        self.registry.register(Box::new(mock))
    }

    fn add_patch(&self, name: &str, file: &str, content: &str) -> Result<()> {
        let dir = self.ctx.patches_dir.join(name);
        std::fs::create_dir_all(&dir)?;
        std::fs::write(dir.join(file), content)?;
        Ok(())
    }

    fn orchestrator(&self) -> Orchestrator<'_> {
        Orchestrator::new(&self.registry, &self.ctx)
    }

    fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }
}

fn requested(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn phases(name: &str) -> Vec<String> {
    ["configure", "compile", "install"]
        .iter()
        .map(|phase| format!("{name}:{phase}"))
        .collect()
}

/// a -> (b, c), b -> d, c -> d
fn diamond() -> Result<Fixture> {
    let mut fixture = Fixture::new()?;
    fixture.add("a", &["b", "c"], None)?;
    fixture.add("b", &["d"], None)?;
    fixture.add("c", &["d"], None)?;
    fixture.add("d", &[], None)?;
    Ok(fixture)
}

#[test]
fn test_dependencies_are_built_first() -> Result<()> {
    let fixture = diamond()?;

    let plan = fixture.orchestrator().plan(&requested(&["a"]))?;
    assert_eq!(plan.built, ["d", "b", "c", "a"]);
    assert!(fixture.journal().is_empty());

    let report = fixture.orchestrator().run(&requested(&["a"]))?;
    assert_eq!(report.built, ["d", "b", "c", "a"]);
    assert!(report.skipped.is_empty());

    let expected: Vec<String> = ["d", "b", "c", "a"].iter().flat_map(|n| phases(n)).collect();
    similar_asserts::assert_eq!(fixture.journal(), expected);

    for name in ["a", "b", "c", "d"] {
        assert!(fixture.ctx.done_marker(name).exists());
        let readme = fixture
            .ctx
            .source_dir(name)
            .join(format!("{name}-1.0"))
            .join("README");
        assert_eq!(std::fs::read_to_string(readme)?, name);
    }
    Ok(())
}

#[test]
fn test_rerun_is_a_noop() -> Result<()> {
    let fixture = diamond()?;
    fixture.orchestrator().run(&requested(&["a"]))?;
    let after_first = fixture.journal();

    let report = fixture.orchestrator().run(&requested(&["a"]))?;
    assert!(report.built.is_empty());
    assert_eq!(report.skipped, ["a"]);
    similar_asserts::assert_eq!(fixture.journal(), after_first);
    Ok(())
}

#[test]
fn test_only_missing_markers_are_rebuilt() -> Result<()> {
    let fixture = diamond()?;
    fixture.orchestrator().run(&requested(&["a"]))?;
    std::fs::remove_file(fixture.ctx.done_marker("a"))?;
    fixture.journal.borrow_mut().clear();

    let report = fixture.orchestrator().run(&requested(&["a"]))?;
    assert_eq!(report.built, ["a"]);
    assert_eq!(report.skipped, ["b", "c"]);
    similar_asserts::assert_eq!(fixture.journal(), phases("a"));
    Ok(())
}

#[test]
fn test_requested_dependency_is_built_once() -> Result<()> {
    let fixture = diamond()?;

    let report = fixture.orchestrator().run(&requested(&["d", "a", "b"]))?;
    assert_eq!(report.built, ["d", "b", "c", "a"]);
    assert_eq!(fixture.journal().len(), 4 * 3);
    Ok(())
}

#[test]
fn test_failure_leaves_no_marker() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.add("app", &["lib"], None)?;
    fixture.add("lib", &[], Some(Phase::Compile))?;

    let err = fixture.orchestrator().run(&requested(&["app"])).unwrap_err();
    match kind_of(&err) {
        Some(BuildError::BuildPhase {
            component, phase, ..
        }) => {
            assert_eq!(component, "lib");
            assert_eq!(*phase, Phase::Compile);
        }
        other => panic!("unexpected error kind: {other:?}"),
    }

    assert!(!fixture.ctx.done_marker("lib").exists());
    assert!(!fixture.ctx.done_marker("app").exists());
    similar_asserts::assert_eq!(
        fixture.journal(),
        vec!["lib:configure".to_string(), "lib:compile".to_string()]
    );
    Ok(())
}

#[test]
fn test_cycle_is_rejected_before_building() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.add("top", &["p"], None)?;
    fixture.add("p", &["q"], None)?;
    fixture.add("q", &["p"], None)?;

    let err = fixture.orchestrator().run(&requested(&["top"])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Configuration(_))));
    assert!(err.to_string().contains("p -> q -> p"), "{err}");
    assert!(fixture.journal().is_empty());
    Ok(())
}

#[test]
fn test_unknown_dependency_is_rejected() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.add("gcc", &["newlib"], None)?;

    let err = fixture.orchestrator().run(&requested(&["gcc"])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Configuration(_))));
    assert!(err.to_string().contains("`newlib`"), "{err}");
    assert!(!fixture.ctx.build_dir.join("sources").exists());
    Ok(())
}

#[test]
fn test_non_buildable_dependency_is_rejected() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let base = ManifestRecipe::parse(
        "name = \"base\"\nsource = \"https://example.org/base-1.0.tar.gz\"\nbuildable = false\n",
        "base.toml",
    )?;
    fixture.registry.register(Box::new(base))?;
    fixture.add("derived", &["base"], None)?;

    let err = fixture.orchestrator().run(&requested(&["derived"])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Configuration(_))));
    assert!(err.to_string().contains("not buildable"), "{err}");
    Ok(())
}

#[test]
fn test_manifest_without_phase_is_a_programming_error() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let uri = fixture.archive_uri("half")?;
    let manifest = format!(
        "name = \"half\"\nsource = \"{uri}\"\n\n[configure]\ncommand = \"true\"\n"
    );
    fixture
        .registry
        .register(Box::new(ManifestRecipe::parse(&manifest, "half.toml")?))?;

    let err = fixture.orchestrator().run(&requested(&["half"])).unwrap_err();
    match kind_of(&err) {
        Some(BuildError::Programming { component, .. }) => assert_eq!(component, "half"),
        other => panic!("unexpected error kind: {other:?}"),
    }
    assert!(!fixture.ctx.done_marker("half").exists());
    Ok(())
}

const GREETING_PATCH: &str = "--- a/README\n+++ b/README\n@@ -1 +1 @@\n-hello\n+hello patched\n";

#[test]
fn test_patches_are_applied_before_configure() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let uri = fixture.archive_with("app", "hello\n")?;
    fixture.add_source("app", Source::unverified(uri), &[], None)?;
    fixture.add_patch("app", "0001-greeting.patch", GREETING_PATCH)?;

    fixture.orchestrator().run(&requested(&["app"]))?;
    similar_asserts::assert_eq!(
        fixture.seen.borrow().clone(),
        vec!["hello patched\n".to_string()]
    );
    similar_asserts::assert_eq!(fixture.journal(), phases("app"));
    assert!(fixture.ctx.patch_marker("0001-greeting.patch").exists());
    assert!(fixture.ctx.done_marker("app").exists());
    Ok(())
}

#[test]
fn test_failing_patch_stops_before_configure() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let uri = fixture.archive_with("app", "goodbye\n")?;
    fixture.add_source("app", Source::unverified(uri), &[], None)?;
    fixture.add_patch("app", "0001-greeting.patch", GREETING_PATCH)?;

    let err = fixture.orchestrator().run(&requested(&["app"])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Patch { .. })), "{err:#}");
    assert!(fixture.journal().is_empty());
    assert!(!fixture.ctx.patch_marker("0001-greeting.patch").exists());
    assert!(!fixture.ctx.done_marker("app").exists());
    Ok(())
}

#[test]
fn test_digest_mismatch_stops_before_extraction() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let source = Source::new(fixture.archive_uri("app")?, "0".repeat(64));
    fixture.add_source("app", source, &[], None)?;

    let err = fixture.orchestrator().run(&requested(&["app"])).unwrap_err();
    assert!(matches!(kind_of(&err), Some(BuildError::Integrity { .. })), "{err:#}");
    assert!(!fixture.ctx.source_dir("app").exists());
    assert!(!fixture.ctx.done_marker("app").exists());
    assert!(fixture.journal().is_empty());
    Ok(())
}

#[test]
fn test_skip_verification_ignores_pin() -> Result<()> {
    let mut fixture = Fixture::new()?;
    fixture.ctx.skip_verification = true;
    let source = Source::new(fixture.archive_uri("app")?, "0".repeat(64));
    fixture.add_source("app", source, &[], None)?;

    let report = fixture.orchestrator().run(&requested(&["app"]))?;
    assert_eq!(report.built, ["app"]);
    similar_asserts::assert_eq!(fixture.journal(), phases("app"));
    similar_asserts::assert_eq!(fixture.seen.borrow().clone(), vec!["app".to_string()]);
    assert!(fixture.ctx.done_marker("app").exists());
    Ok(())
}

#[test]
fn test_fetch_failure_is_not_a_phase_error() -> Result<()> {
    let mut fixture = Fixture::new()?;
    let missing = file_uri(&fixture.root.path().join("mirror").join("gone-1.0.tar.gz"));
    fixture.add_source("gone", Source::unverified(missing), &[], None)?;

    let err = fixture.orchestrator().run(&requested(&["gone"])).unwrap_err();
    assert!(kind_of(&err).is_none(), "{err:#}");
    assert!(err.to_string().contains("gone: fetch failed"), "{err}");
    assert!(fixture.journal().is_empty());
    Ok(())
}
