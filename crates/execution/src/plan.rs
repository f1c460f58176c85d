//! Resolved plans: what one invocation will enter, and in which order.

use crate::command::Command;
use crate::dependency::DependencyGraph;
use crate::error::ResolveError;
use crate::mode::{ExecutionModel, ExecutionProfile, ModeResolver};
use crate::registry::UnitRegistry;
use crate::scheduler::Scheduler;
use ignite_core::{InvocationId, UnitDescriptor, UnitMode, UnitName};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Caller additions to a command's own targets.
#[derive(Debug, Clone, Default)]
pub struct PlanRequest {
    /// Extra units to plan
    pub targets: Vec<UnitName>,
    /// Units kept in the order but not set up
    pub disabled: Vec<UnitName>,
}

impl PlanRequest {
    /// Create an empty request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an extra unit.
    pub fn target(mut self, unit: impl Into<UnitName>) -> Self {
        self.targets.push(unit.into());
        self
    }

    /// Request extra units.
    pub fn targets(mut self, units: impl IntoIterator<Item = impl Into<UnitName>>) -> Self {
        self.targets.extend(units.into_iter().map(Into::into));
        self
    }

    /// Disable a unit.
    pub fn disable(mut self, unit: impl Into<UnitName>) -> Self {
        self.disabled.push(unit.into());
        self
    }

    /// Disable units.
    pub fn disable_all(mut self, units: impl IntoIterator<Item = impl Into<UnitName>>) -> Self {
        self.disabled.extend(units.into_iter().map(Into::into));
        self
    }
}

/// One unit of a plan.
#[derive(Debug, Clone)]
pub struct PlanStep {
    /// The unit
    pub unit: Arc<UnitDescriptor>,
    /// Skipped on entry and exit
    pub disabled: bool,
}

/// The ordered, conflict-free and cycle-free units of one invocation.
///
/// Built fresh for every invocation and never reused.
pub struct ResolvedPlan {
    id: InvocationId,
    command: Arc<dyn Command>,
    steps: Vec<PlanStep>,
    profile: ExecutionProfile,
}

impl ResolvedPlan {
    /// Resolve the plan of `command` against `registry`.
    ///
    /// Nothing is entered here; every error returned is safe to retry after
    /// fixing the declarations.
    pub fn resolve(
        registry: &UnitRegistry,
        command: Arc<dyn Command>,
        request: &PlanRequest,
    ) -> Result<Self, ResolveError> {
        let id = InvocationId::new();

        for name in &request.disabled {
            if !registry.contains(name.as_str()) {
                return Err(ResolveError::UnknownUnit {
                    name: name.clone(),
                    referenced_by: None,
                });
            }
        }

        let mut requested = command.targets();
        requested.extend(request.targets.iter().cloned());

        let graph = DependencyGraph::build_skipping(registry, &requested, &request.disabled)?;
        let order = Scheduler::order(&graph)?;

        let disabled: HashSet<&UnitName> = request.disabled.iter().collect();
        let steps: Vec<_> = order
            .into_iter()
            .map(|unit| PlanStep {
                disabled: disabled.contains(&unit.name) || graph.is_excluded(&unit.name),
                unit,
            })
            .collect();

        let profile = ModeResolver::resolve(
            command.as_ref(),
            steps
                .iter()
                .filter(|step| !step.disabled)
                .map(|step| step.unit.as_ref()),
        )?;

        for step in steps.iter().filter(|step| step.disabled) {
            debug!(unit = %step.unit.name, "Unit disabled");
        }
        info!(
            %id,
            command = command.name(),
            units = steps.len(),
            model = %profile.model,
            "Resolved plan"
        );

        Ok(Self {
            id,
            command,
            steps,
            profile,
        })
    }

    /// Resolve a plan that wraps caller code instead of a registered
    /// command.
    ///
    /// Only `request` decides which units are planned. `mode` is the
    /// protocol of the wrapped code: an asynchronous scope may plan
    /// asynchronous units. No signals are dispatched around the scope.
    pub fn resolve_scope(
        registry: &UnitRegistry,
        request: &PlanRequest,
        mode: UnitMode,
    ) -> Result<Self, ResolveError> {
        Self::resolve(registry, Arc::new(ScopeCommand { mode }), request)
    }

    /// Invocation id.
    pub fn id(&self) -> InvocationId {
        self.id
    }

    /// The command to run.
    pub fn command(&self) -> &Arc<dyn Command> {
        &self.command
    }

    /// Steps in entry order.
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Unit names in entry order, disabled units included.
    pub fn names(&self) -> Vec<&UnitName> {
        self.steps.iter().map(|step| &step.unit.name).collect()
    }

    /// Number of planned units.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the plan has no units.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Scheduling model.
    pub fn model(&self) -> ExecutionModel {
        self.profile.model
    }

    /// Full execution profile.
    pub fn profile(&self) -> &ExecutionProfile {
        &self.profile
    }

    /// Whether any unit asks for multi-worker execution.
    pub fn requires_multi_worker(&self) -> bool {
        self.profile.requires_multi_worker()
    }

    /// Units asking for multi-worker execution.
    pub fn multi_worker_units(&self) -> &[UnitName] {
        &self.profile.multi_worker_units
    }
}

impl std::fmt::Debug for ResolvedPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedPlan")
            .field("id", &self.id)
            .field("command", &self.command.name())
            .field("steps", &self.names())
            .field("profile", &self.profile)
            .finish()
    }
}

/// Stand-in command for [`ResolvedPlan::resolve_scope`].
struct ScopeCommand {
    mode: UnitMode,
}

impl Command for ScopeCommand {
    fn name(&self) -> &'static str {
        "scope"
    }

    fn mode(&self) -> UnitMode {
        self.mode
    }

    fn emits_signals(&self) -> bool {
        false
    }
}
