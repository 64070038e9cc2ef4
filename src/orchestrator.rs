//! Dependency-driven, resumable builds.
//!
//! Each recipe moves through `Pending -> Building -> Done`. `Done` is persisted as a
//! `<name>_done` marker in the build directory and checked on entry, so re-running a build only
//! does the work that is left. A recipe that fails leaves no marker and starts over from `fetch`
//! on the next run.
use std::{
    collections::{HashMap, HashSet},
    fs::File,
};

use anyhow::{Context, Result};

use crate::{context::BuildContext, error::BuildError, recipe::build, registry::Registry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done,
}

/// What a successful run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    /// Recipes built by this run, in build order.
    pub built: Vec<String>,
    /// Requested recipes and dependencies skipped because their marker existed.
    pub skipped: Vec<String>,
}

pub struct Orchestrator<'a> {
    registry: &'a Registry,
    ctx: &'a BuildContext,
}

impl<'a> Orchestrator<'a> {
    pub fn new(registry: &'a Registry, ctx: &'a BuildContext) -> Self {
        Self { registry, ctx }
    }

    pub fn is_done(&self, name: impl AsRef<str>) -> bool {
        self.ctx.done_marker(name).exists()
    }

    /// Check that every requested recipe and everything it depends on exists, is buildable and
    /// that the dependency graph has no cycle.
    ///
    /// Completion markers are ignored here: a broken graph is reported even if parts of it were
    /// built before.
    pub fn validate(&self, requested: &[String]) -> Result<()> {
        let mut visits = HashMap::new();
        let mut stack = Vec::new();
        for name in requested {
            self.validate_one(name, &mut visits, &mut stack)?;
        }
        Ok(())
    }

    fn validate_one(
        &self,
        name: &str,
        visits: &mut HashMap<String, Visit>,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        match visits.get(name) {
            Some(Visit::Done) => return Ok(()),
            Some(Visit::InProgress) => {
                let start = stack.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = stack[start..].to_vec();
                cycle.push(name.to_string());
                return Err(BuildError::configuration(format!(
                    "dependency cycle: {}",
                    cycle.join(" -> ")
                ))
                .into());
            }
            None => {}
        }

        let recipe = match self.registry.get(name) {
            Some(recipe) if recipe.is_buildable() => recipe,
            found => {
                let problem = if found.is_some() {
                    "is not buildable"
                } else {
                    "is not a known recipe"
                };
                let msg = match stack.last() {
                    Some(parent) => format!("`{parent}` depends on `{name}`, which {problem}"),
                    None => format!("`{name}` {problem}"),
                };
                return Err(BuildError::configuration(msg).into());
            }
        };

        visits.insert(name.to_string(), Visit::InProgress);
        stack.push(name.to_string());
        for dependency in recipe.dependencies() {
            self.validate_one(&dependency, visits, stack)?;
        }
        stack.pop();
        visits.insert(name.to_string(), Visit::Done);
        Ok(())
    }

    /// The recipes `run` would build, in order: dependencies depth-first before their
    /// dependents, every recipe once. A recipe whose marker exists is skipped together with its
    /// dependencies.
    pub fn plan(&self, requested: &[String]) -> Result<Report> {
        self.validate(requested)?;

        let mut report = Report::default();
        let mut seen = HashSet::new();
        for name in requested {
            self.plan_one(name, &mut seen, &mut report)?;
        }
        Ok(report)
    }

    fn plan_one(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
        report: &mut Report,
    ) -> Result<()> {
        if !seen.insert(name.to_string()) {
            return Ok(());
        }

        if self.is_done(name) {
            report.skipped.push(name.to_string());
        } else {
            let recipe = self.registry.buildable(name)?;
            for dependency in recipe.dependencies() {
                self.plan_one(&dependency, seen, report)?;
            }
            report.built.push(name.to_string());
        }
        Ok(())
    }

    /// Build `requested` and everything it depends on.
    ///
    /// The first failure aborts the run; recipes built before it keep their markers.
    pub fn run(&self, requested: &[String]) -> Result<Report> {
        let report = self.plan(requested)?;

        for name in &report.skipped {
            log::info!("=> {name} already built");
        }

        for name in &report.built {
            let recipe = self.registry.buildable(name)?;
            build(recipe, self.ctx)?;

            let marker = self.ctx.done_marker(name);
            File::create(&marker).context(format!("creating {}", marker.display()))?;
            log::debug!("{} created", marker.display());
        }

        Ok(report)
    }
}
