use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::Result;
use colored::Colorize;

use crate::{
    error::BuildError,
    manifest,
    packages::{binutils::Binutils, gcc::Gcc, newlib::Newlib},
    recipe::Recipe,
};

/// All known recipes, in registration order.
#[derive(Default)]
pub struct Registry {
    recipes: Vec<Box<dyn Recipe>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in arm-none-eabi recipes.
    pub fn builtin() -> Self {
        Self {
            recipes: vec![
                Box::new(Binutils::default()),
                Box::new(Newlib::default()),
                Box::new(Gcc::default()),
            ],
        }
    }

    pub fn register(&mut self, recipe: Box<dyn Recipe>) -> Result<()> {
        let name = recipe.name();
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(BuildError::configuration(format!("invalid recipe name `{name}`")).into());
        }
        if self.get(name).is_some() {
            return Err(
                BuildError::configuration(format!("recipe `{name}` is defined twice")).into(),
            );
        }
        log::trace!("registered recipe `{name}`");
        self.recipes.push(recipe);
        Ok(())
    }

    /// Register every recipe defined in `dir` and return the names of all buildable recipes.
    pub fn discover(&mut self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        for recipe in manifest::load_dir(dir)? {
            self.register(Box::new(recipe))?;
        }
        Ok(self.names())
    }

    /// Names of the buildable recipes, in registration order.
    pub fn names(&self) -> Vec<String> {
        self.recipes
            .iter()
            .filter(|r| r.is_buildable())
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Look up any registered recipe, buildable or not.
    pub fn get(&self, name: impl AsRef<str>) -> Option<&dyn Recipe> {
        self.recipes
            .iter()
            .find(|r| r.name() == name.as_ref())
            .map(|r| r.as_ref())
    }

    /// Look up a recipe that may be built.
    pub fn buildable(&self, name: impl AsRef<str>) -> Result<&dyn Recipe> {
        let name = name.as_ref();
        match self.get(name) {
            Some(recipe) if recipe.is_buildable() => Ok(recipe),
            Some(_) => Err(
                BuildError::configuration(format!("recipe `{name}` is not buildable")).into(),
            ),
            None => Err(BuildError::configuration(format!("unknown recipe `{name}`")).into()),
        }
    }
}

/// Which components to build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    All,
    Only(Vec<String>),
}

impl FromStr for Selection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim() == "all" {
            return Ok(Selection::All);
        }

        let names: Vec<String> = s
            .split(',')
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(String::from)
            .collect();

        if names.is_empty() {
            return Err(BuildError::configuration("no components selected").into());
        }
        Ok(Selection::Only(names))
    }
}

/// Keep the names of `all` that are selected, in the order of `all`.
pub fn filter(all: &[String], selection: &Selection) -> Vec<String> {
    match selection {
        Selection::All => all.to_vec(),
        Selection::Only(requested) => all
            .iter()
            .filter(|name| requested.contains(name))
            .cloned()
            .collect(),
    }
}

/// Like [`filter`], but selecting a name that isn't in `all` is an error.
pub fn select(all: &[String], selection: &Selection) -> Result<Vec<String>> {
    if let Selection::Only(requested) = selection {
        let unknown: Vec<&str> = requested
            .iter()
            .filter(|name| !all.contains(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(BuildError::configuration(format!(
                "unknown components: {} (available: {})",
                unknown.join(", "),
                all.join(", ")
            ))
            .into());
        }
    }
    Ok(filter(all, selection))
}

/// Listing printed by `--show-components`.
pub fn show(names: &[String]) -> String {
    let mut out = String::from("Available components:\n");
    for name in names {
        let _ = writeln!(out, " - {}", name.bold());
    }
    out
}
