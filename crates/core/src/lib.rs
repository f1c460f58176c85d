//! ignite core data models.
//!
//! This crate defines the units, configuration and lifecycle vocabulary
//! shared by the resolver, the orchestrator and the built-in units.

#![warn(missing_docs)]

// Identities
mod id;

// Units and their phases
mod unit;
mod phase;
mod signal;

// Configuration
mod config;
mod vars;

// Re-exports
pub use id::*;

pub use unit::{
    AsyncUnit, FnUnit, Relation, SetupError, SyncUnit, UnitBehavior, UnitDescriptor, UnitMode,
    UnitName,
};
pub use phase::{BoxFuture, Phase};
pub use signal::Signal;

pub use config::{Config, ConfigError};
pub use vars::{ConfigVar, VarRegistry, VarReport, Variable};
