//! Units: named, orderable setup/teardown pairs.

use crate::config::{Config, ConfigError};
use crate::phase::Phase;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::sync::Arc;
use thiserror::Error;

/// Name of a unit, unique within a registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitName(String);

impl UnitName {
    /// Create a unit name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Get the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UnitName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UnitName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for UnitName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl AsRef<str> for UnitName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UnitName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Which setup/teardown protocol a unit implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitMode {
    /// Setup and teardown never suspend.
    Synchronous,
    /// Setup and teardown may suspend; requires the cooperative model.
    Asynchronous,
}

/// Failure of a unit's setup phase.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The unit asked to end initialization early without failing,
    /// e.g. after printing help.
    #[error("initialization stopped")]
    Stop,

    /// The unit could not be set up.
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl SetupError {
    /// Build a failure from a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Self::Failed(anyhow::Error::msg(message))
    }
}

impl From<ConfigError> for SetupError {
    fn from(err: ConfigError) -> Self {
        Self::Failed(err.into())
    }
}

/// A unit whose phases run to completion without suspending.
pub trait SyncUnit: Send + Sync {
    /// Acquire whatever the unit provides.
    fn setup(&self, config: &mut Config) -> Result<(), SetupError>;

    /// Release it again. Runs only if `setup` succeeded.
    fn teardown(&self, _config: &mut Config) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A unit whose phases may suspend.
#[async_trait]
pub trait AsyncUnit: Send + Sync {
    /// Acquire whatever the unit provides.
    async fn setup(&self, config: &mut Config) -> Result<(), SetupError>;

    /// Release it again. Runs only if `setup` succeeded.
    async fn teardown(&self, _config: &mut Config) -> anyhow::Result<()> {
        Ok(())
    }
}

type SetupFn = dyn Fn(&mut Config) -> Result<(), SetupError> + Send + Sync;
type TeardownFn = dyn Fn(&mut Config) -> anyhow::Result<()> + Send + Sync;

/// A synchronous unit built from closures.
pub struct FnUnit {
    setup: Box<SetupFn>,
    teardown: Box<TeardownFn>,
}

impl FnUnit {
    /// Create a unit from a setup and a teardown closure.
    pub fn new<S, T>(setup: S, teardown: T) -> Self
    where
        S: Fn(&mut Config) -> Result<(), SetupError> + Send + Sync + 'static,
        T: Fn(&mut Config) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            setup: Box::new(setup),
            teardown: Box::new(teardown),
        }
    }
}

impl SyncUnit for FnUnit {
    fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        (self.setup)(config)
    }

    fn teardown(&self, config: &mut Config) -> anyhow::Result<()> {
        (self.teardown)(config)
    }
}

/// What a unit does, tagged by protocol.
#[derive(Clone)]
pub enum UnitBehavior {
    /// No work; the unit only groups or orders others.
    Marker,
    /// Synchronous setup/teardown.
    Sync(Arc<dyn SyncUnit>),
    /// Suspension-capable setup/teardown.
    Async(Arc<dyn AsyncUnit>),
}

impl UnitBehavior {
    /// Protocol implemented by this behavior.
    pub fn mode(&self) -> UnitMode {
        match self {
            Self::Marker | Self::Sync(_) => UnitMode::Synchronous,
            Self::Async(_) => UnitMode::Asynchronous,
        }
    }

    /// Start the setup phase.
    pub fn setup<'a>(&'a self, config: &'a mut Config) -> Phase<'a, Result<(), SetupError>> {
        match self {
            Self::Marker => Phase::Ready(Ok(())),
            Self::Sync(unit) => Phase::Ready(unit.setup(config)),
            Self::Async(unit) => Phase::Suspended(unit.setup(config)),
        }
    }

    /// Start the teardown phase.
    pub fn teardown<'a>(&'a self, config: &'a mut Config) -> Phase<'a, anyhow::Result<()>> {
        match self {
            Self::Marker => Phase::Ready(Ok(())),
            Self::Sync(unit) => Phase::Ready(unit.teardown(config)),
            Self::Async(unit) => Phase::Suspended(unit.teardown(config)),
        }
    }
}

impl std::fmt::Debug for UnitBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marker => f.write_str("Marker"),
            Self::Sync(_) => f.write_str("Sync(..)"),
            Self::Async(_) => f.write_str("Async(..)"),
        }
    }
}

/// How a unit refers to another unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    /// Must be set up first and is pulled into the plan.
    DependsOn,
    /// Must never share a plan.
    ConflictsWith,
    /// Ordered first if both are planned.
    After,
    /// Ordered later if both are planned.
    Before,
    /// Member of a group unit.
    BelongsTo,
}

/// A registered unit and its declared metadata.
#[derive(Debug, Clone)]
pub struct UnitDescriptor {
    /// Unique name
    pub name: UnitName,

    /// Short description
    pub description: String,

    /// Units that must be fully set up before this one
    pub dependencies: Vec<UnitName>,

    /// Units that must never be resolved together with this one
    pub conflicts: Vec<UnitName>,

    /// Units ordered before this one when both are in a plan
    pub after: Vec<UnitName>,

    /// Units ordered after this one when both are in a plan
    pub before: Vec<UnitName>,

    /// Group units this unit is a member of
    pub groups: Vec<UnitName>,

    /// As a group, plans at most one of its members
    pub exclusive: bool,

    /// Requests isolated multi-worker execution
    pub multi_worker: bool,

    /// Setup/teardown behavior
    pub behavior: UnitBehavior,
}

impl UnitDescriptor {
    /// Create a unit with the given behavior.
    pub fn new(name: impl Into<UnitName>, behavior: UnitBehavior) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            dependencies: Vec::new(),
            conflicts: Vec::new(),
            after: Vec::new(),
            before: Vec::new(),
            groups: Vec::new(),
            exclusive: false,
            multi_worker: false,
            behavior,
        }
    }

    /// Create a unit that does no work.
    pub fn marker(name: impl Into<UnitName>) -> Self {
        Self::new(name, UnitBehavior::Marker)
    }

    /// Create a synchronous unit.
    pub fn sync(name: impl Into<UnitName>, unit: impl SyncUnit + 'static) -> Self {
        Self::new(name, UnitBehavior::Sync(Arc::new(unit)))
    }

    /// Create an asynchronous unit.
    pub fn asynchronous(name: impl Into<UnitName>, unit: impl AsyncUnit + 'static) -> Self {
        Self::new(name, UnitBehavior::Async(Arc::new(unit)))
    }

    /// Create a synchronous unit from closures.
    pub fn from_fns<S, T>(name: impl Into<UnitName>, setup: S, teardown: T) -> Self
    where
        S: Fn(&mut Config) -> Result<(), SetupError> + Send + Sync + 'static,
        T: Fn(&mut Config) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self::sync(name, FnUnit::new(setup, teardown))
    }

    /// Set description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a dependency.
    pub fn depends_on(mut self, unit: impl Into<UnitName>) -> Self {
        self.dependencies.push(unit.into());
        self
    }

    /// Add a conflict.
    pub fn conflicts_with(mut self, unit: impl Into<UnitName>) -> Self {
        self.conflicts.push(unit.into());
        self
    }

    /// Order after `unit` if both are planned.
    pub fn after(mut self, unit: impl Into<UnitName>) -> Self {
        self.after.push(unit.into());
        self
    }

    /// Order before `unit` if both are planned.
    pub fn before(mut self, unit: impl Into<UnitName>) -> Self {
        self.before.push(unit.into());
        self
    }

    /// Join the group `unit`.
    ///
    /// Requesting a group plans its members, and the group's `after` and
    /// `before` constraints apply to each member.
    pub fn belongs_to(mut self, unit: impl Into<UnitName>) -> Self {
        self.groups.push(unit.into());
        self
    }

    /// Make this unit an exclusive group: one member per plan.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Mark the unit as requesting multi-worker execution.
    pub fn multi_worker(mut self) -> Self {
        self.multi_worker = true;
        self
    }

    /// Protocol implemented by this unit.
    pub fn mode(&self) -> UnitMode {
        self.behavior.mode()
    }

    /// Check if this unit declares a conflict with `other`.
    pub fn declares_conflict(&self, other: &UnitName) -> bool {
        self.conflicts.contains(other)
    }

    /// Every unit name this unit refers to, with the kind of reference.
    pub fn references(&self) -> impl Iterator<Item = (Relation, &UnitName)> {
        self.dependencies
            .iter()
            .map(|name| (Relation::DependsOn, name))
            .chain(self.conflicts.iter().map(|name| (Relation::ConflictsWith, name)))
            .chain(self.after.iter().map(|name| (Relation::After, name)))
            .chain(self.before.iter().map(|name| (Relation::Before, name)))
            .chain(self.groups.iter().map(|name| (Relation::BelongsTo, name)))
    }
}
