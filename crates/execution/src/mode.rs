//! Execution-mode resolution.

use crate::command::Command;
use crate::error::ResolveError;
use ignite_core::{UnitDescriptor, UnitMode, UnitName};
use serde::Serialize;

/// Scheduling model an invocation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionModel {
    /// Plain sequential calls; nothing suspends.
    Synchronous,
    /// Single-threaded cooperative scheduling; phases may suspend.
    Cooperative,
}

impl std::fmt::Display for ExecutionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synchronous => f.write_str("synchronous"),
            Self::Cooperative => f.write_str("cooperative"),
        }
    }
}

/// How an invocation must be executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionProfile {
    /// Scheduling model
    pub model: ExecutionModel,
    /// Units asking for multi-worker execution, in plan order.
    /// Provisioning them is left to the host program.
    pub multi_worker_units: Vec<UnitName>,
}

impl ExecutionProfile {
    /// Whether any planned unit asks for multi-worker execution.
    pub fn requires_multi_worker(&self) -> bool {
        !self.multi_worker_units.is_empty()
    }
}

/// Reconciles the modes of a command and its units.
pub struct ModeResolver;

impl ModeResolver {
    /// Decide the execution profile of `command` over `units`.
    ///
    /// An asynchronous unit forces the cooperative model, which only an
    /// asynchronous command can host.
    pub fn resolve<'a>(
        command: &dyn Command,
        units: impl IntoIterator<Item = &'a UnitDescriptor>,
    ) -> Result<ExecutionProfile, ResolveError> {
        let mut first_async = None;
        let mut multi_worker_units = Vec::new();

        for unit in units {
            if unit.multi_worker {
                if !command.allows_multi_worker() {
                    return Err(ResolveError::MultiWorkerNotAllowed {
                        command: command.name().to_string(),
                        unit: unit.name.clone(),
                    });
                }
                multi_worker_units.push(unit.name.clone());
            }
            if first_async.is_none() && unit.mode() == UnitMode::Asynchronous {
                first_async = Some(&unit.name);
            }
        }

        let model = match (command.mode(), first_async) {
            (UnitMode::Asynchronous, _) => ExecutionModel::Cooperative,
            (UnitMode::Synchronous, None) => ExecutionModel::Synchronous,
            (UnitMode::Synchronous, Some(unit)) => {
                return Err(ResolveError::ModeMismatch {
                    command: command.name().to_string(),
                    unit: unit.clone(),
                })
            }
        };

        Ok(ExecutionProfile {
            model,
            multi_worker_units,
        })
    }
}
