//! Fatal error kinds.
//!
//! Every function in the crate returns `anyhow::Result`. Conditions that abort a build are raised
//! as a [`BuildError`] wrapped in `anyhow::Error`, so a caller can branch on the kind with
//! `err.downcast_ref::<BuildError>()`.
use std::{fmt::Display, path::PathBuf};

use thiserror::Error;

/// A phase of the recipe lifecycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Fetch,
    Unpack,
    Patch,
    Configure,
    Compile,
    Install,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Fetch => "fetch",
            Phase::Unpack => "unpack",
            Phase::Patch => "patch",
            Phase::Configure => "configure",
            Phase::Compile => "compile",
            Phase::Install => "install",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum BuildError {
    /// Missing recipe field, unknown or cyclic dependency, bad settings.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error(
        "SHA256 doesn't match for {}\n  Expected  : {expected}\n  Calculated: {actual}",
        path.display()
    )]
    Integrity {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("failed to apply patch {}: {reason}", patch.display())]
    Patch { patch: PathBuf, reason: String },

    /// A configure/compile/install step returned a failure.
    #[error("{component}: {phase} failed: {reason}")]
    BuildPhase {
        component: String,
        phase: Phase,
        reason: String,
    },

    /// The recipe definition itself is malformed.
    #[error("malformed recipe `{component}`: {reason}")]
    Programming { component: String, reason: String },
}

impl BuildError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        BuildError::Configuration(msg.into())
    }
}

/// Returns the [`BuildError`] kind carried by `err`, if any.
pub fn kind_of(err: &anyhow::Error) -> Option<&BuildError> {
    err.downcast_ref::<BuildError>()
}
