//! Execution layer - unit resolution, ordering, and lifecycle orchestration.

#![warn(missing_docs)]

pub mod command;
pub mod dependency;
pub mod engine;
pub mod error;
pub mod mode;
pub mod notifier;
pub mod plan;
pub mod registry;
pub mod scheduler;
pub mod shutdown;

pub use command::{Command, CommandArgs, CommandRegistry};
pub use dependency::DependencyGraph;
pub use engine::{Orchestrator, Outcome};
pub use error::{RegistryError, ResolveError, RunError, TeardownFailure};
pub use mode::{ExecutionModel, ExecutionProfile, ModeResolver};
pub use notifier::{Notifier, NotifierSet};
pub use plan::{PlanRequest, PlanStep, ResolvedPlan};
pub use registry::UnitRegistry;
pub use scheduler::Scheduler;
pub use shutdown::{wait_for_shutdown_signal, ShutdownListener, TerminationGuard};
