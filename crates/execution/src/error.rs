//! Error types for registration, resolution and running.

use ignite_core::UnitName;
use thiserror::Error;

/// Errors raised while registering units or commands.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A unit with the same name is already registered.
    #[error("unit `{0}` is already registered")]
    DuplicateUnit(UnitName),

    /// A command with the same name is already registered.
    #[error("command `{0}` is already registered")]
    DuplicateCommand(String),
}

/// Errors raised while resolving a plan. No unit has been entered when
/// one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// A unit name is referenced but not registered.
    #[error("unknown unit `{name}`{}", required_by(.referenced_by))]
    UnknownUnit {
        /// The missing name
        name: UnitName,
        /// The unit that referenced it, if any
        referenced_by: Option<UnitName>,
    },

    /// Two units of the plan conflict with each other.
    #[error("units `{first}` and `{second}` conflict and cannot run together")]
    Conflict {
        /// Unit declared first
        first: UnitName,
        /// Unit declared second
        second: UnitName,
    },

    /// The dependency graph contains a cycle.
    #[error("cyclic dependency: {}", join_cycle(.cycle))]
    CyclicDependency {
        /// Units along the cycle; the first unit is repeated at the end
        cycle: Vec<UnitName>,
    },

    /// A synchronous command needs an asynchronous unit.
    #[error("command `{command}` is synchronous but unit `{unit}` is asynchronous")]
    ModeMismatch {
        /// Command name
        command: String,
        /// First asynchronous unit of the plan
        unit: UnitName,
    },

    /// A unit asks for multi-worker execution the command does not allow.
    #[error("unit `{unit}` requests multi-worker execution, which command `{command}` does not allow")]
    MultiWorkerNotAllowed {
        /// Command name
        command: String,
        /// Requesting unit
        unit: UnitName,
    },
}

fn required_by(referrer: &Option<UnitName>) -> String {
    referrer
        .as_ref()
        .map(|name| format!(" (referenced by `{name}`)"))
        .unwrap_or_default()
}

fn join_cycle(cycle: &[UnitName]) -> String {
    cycle
        .iter()
        .map(UnitName::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A teardown that failed during unwind.
#[derive(Debug)]
pub struct TeardownFailure {
    /// Unit whose teardown failed
    pub unit: UnitName,
    /// The failure
    pub error: anyhow::Error,
}

impl std::fmt::Display for TeardownFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "`{}`: {:#}", self.unit, self.error)
    }
}

/// Errors raised while running a resolved plan.
///
/// Every variant keeps the teardown failures of the unwind that followed,
/// so neither the original failure nor a cleanup failure is dropped.
#[derive(Debug, Error)]
pub enum RunError {
    /// A unit's setup failed; the entered prefix was unwound.
    #[error("setup of unit `{unit}` failed: {source:#}{}", cleanup(.teardown))]
    Setup {
        /// Unit whose setup failed
        unit: UnitName,
        /// The failure
        source: anyhow::Error,
        /// Failures while unwinding the entered prefix
        teardown: Vec<TeardownFailure>,
    },

    /// The command body failed; every entered unit was torn down.
    #[error("command `{command}` failed: {source:#}{}", cleanup(.teardown))]
    Command {
        /// Command name
        command: String,
        /// The failure
        source: anyhow::Error,
        /// Failures while tearing down
        teardown: Vec<TeardownFailure>,
    },

    /// A shutdown request interrupted the command body.
    #[error("command `{command}` was interrupted by a shutdown request{}", cleanup(.teardown))]
    Interrupted {
        /// Command name
        command: String,
        /// Failures while tearing down
        teardown: Vec<TeardownFailure>,
    },

    /// A plan that needs the cooperative model was run synchronously.
    #[error("command `{command}` needs the cooperative model and cannot run synchronously")]
    RequiresCooperative {
        /// Command name
        command: String,
    },

    /// Only teardown failed.
    #[error("cleanup failed: {}", list(.teardown))]
    Teardown {
        /// Failures while tearing down
        teardown: Vec<TeardownFailure>,
    },
}

impl RunError {
    /// Teardown failures recorded alongside the error.
    pub fn teardown_failures(&self) -> &[TeardownFailure] {
        match self {
            Self::Setup { teardown, .. }
            | Self::Command { teardown, .. }
            | Self::Interrupted { teardown, .. }
            | Self::Teardown { teardown } => teardown.as_slice(),
            Self::RequiresCooperative { .. } => &[],
        }
    }
}

fn list(failures: &[TeardownFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn cleanup(failures: &[TeardownFailure]) -> String {
    if failures.is_empty() {
        String::new()
    } else {
        format!("; cleanup also failed: {}", list(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_unit_display() {
        let err = ResolveError::UnknownUnit {
            name: "db".into(),
            referenced_by: Some("cache".into()),
        };
        assert_eq!(err.to_string(), "unknown unit `db` (referenced by `cache`)");

        let err = ResolveError::UnknownUnit {
            name: "db".into(),
            referenced_by: None,
        };
        assert_eq!(err.to_string(), "unknown unit `db`");
    }

    #[test]
    fn test_cycle_display() {
        let err = ResolveError::CyclicDependency {
            cycle: vec!["x".into(), "y".into(), "x".into()],
        };
        assert_eq!(err.to_string(), "cyclic dependency: x -> y -> x");
    }

    #[test]
    fn test_run_error_lists_cleanup_failures() {
        let err = RunError::Command {
            command: "serve".to_string(),
            source: anyhow::anyhow!("port in use"),
            teardown: vec![TeardownFailure {
                unit: "db".into(),
                error: anyhow::anyhow!("flush failed"),
            }],
        };

        assert_eq!(
            err.to_string(),
            "command `serve` failed: port in use; cleanup also failed: `db`: flush failed"
        );
        assert_eq!(err.teardown_failures().len(), 1);
    }

    #[test]
    fn test_run_error_without_cleanup_failures() {
        let err = RunError::Setup {
            unit: "n".into(),
            source: anyhow::anyhow!("boom"),
            teardown: Vec::new(),
        };
        assert_eq!(err.to_string(), "setup of unit `n` failed: boom");
        assert!(err.teardown_failures().is_empty());
    }
}
