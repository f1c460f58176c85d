//! Built-in units and notifiers.
//!
//! Every program gets `parse_config` and `set_log_level`; `show_vars` is
//! registered by hosts that offer a variable listing.

#![warn(missing_docs)]

pub mod config_file;
pub mod logging;
pub mod show_vars;
pub mod systemd;
pub mod vars;

pub use config_file::{parse_config, PARSE_CONFIG};
pub use logging::{level_for, set_log_level, LoggingNotifier, SET_LOG_LEVEL};
pub use show_vars::{show_vars, SHOW_VARS};
pub use systemd::SystemdNotifier;

use ignite_core::UnitName;
use ignite_execution::{RegistryError, UnitRegistry};

/// Register `parse_config` and `set_log_level`.
pub fn register_defaults(registry: &mut UnitRegistry) -> Result<(), RegistryError> {
    registry.register(parse_config())?;
    registry.register(set_log_level())?;
    Ok(())
}

/// Units every invocation requests.
pub fn base_targets() -> Vec<UnitName> {
    vec![PARSE_CONFIG.into(), SET_LOG_LEVEL.into()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignite_execution::{DependencyGraph, Scheduler};

    #[test]
    fn test_defaults_resolve_in_order() {
        let mut registry = UnitRegistry::new();
        register_defaults(&mut registry).unwrap();

        let graph = DependencyGraph::build(&registry, &[SET_LOG_LEVEL.into(), PARSE_CONFIG.into()]).unwrap();
        let order: Vec<_> = Scheduler::order(&graph)
            .unwrap()
            .iter()
            .map(|unit| unit.name.to_string())
            .collect();
        assert_eq!(order, vec![PARSE_CONFIG, SET_LOG_LEVEL]);
        assert_eq!(base_targets().len(), 2);
    }

    #[test]
    fn test_register_defaults_twice_fails() {
        let mut registry = UnitRegistry::new();
        register_defaults(&mut registry).unwrap();
        assert!(register_defaults(&mut registry).is_err());
    }
}
