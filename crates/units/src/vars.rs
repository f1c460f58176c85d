//! Configuration variables read by the built-in units.

use ignite_core::{ConfigError, ConfigVar, VarRegistry};

/// Number of `-v` flags.
pub static VERBOSE: ConfigVar<u8> = ConfigVar::new("VERBOSE", "Verbosity level", Some(0));

/// JSON file merged into the configuration by `parse_config`.
pub static CONFIG_FILE: ConfigVar<Option<String>> =
    ConfigVar::new("CONFIG", "Config file to parse", Some(None));

/// Whether the service manager is told about readiness.
pub static SYSTEMD_NOTIFY: ConfigVar<bool> = ConfigVar::new(
    "SYSTEMD_NOTIFY",
    "If systemd should be informed of startup and shutdown",
    Some(false),
);

/// Worker count handed to whoever provisions multi-worker units.
pub static WORKERS: ConfigVar<u32> = ConfigVar::new(
    "NUMBER_OF_WORKERS",
    "Number of workers for multi-worker units",
    Some(1),
);

/// Register every variable above.
pub fn register(vars: &mut VarRegistry) -> Result<(), ConfigError> {
    vars.register(&VERBOSE)?;
    vars.register(&CONFIG_FILE)?;
    vars.register(&SYSTEMD_NOTIFY)?;
    vars.register(&WORKERS)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ignite_core::Config;

    #[test]
    fn test_defaults() {
        let config = Config::new();
        assert_eq!(VERBOSE.get(&config).unwrap(), 0);
        assert_eq!(CONFIG_FILE.get(&config).unwrap(), None);
        assert!(!SYSTEMD_NOTIFY.get(&config).unwrap());
        assert_eq!(WORKERS.get(&config).unwrap(), 1);
    }

    #[test]
    fn test_register_twice_fails() {
        let mut vars = VarRegistry::new();
        register(&mut vars).unwrap();
        assert_eq!(vars.len(), 4);
        assert!(register(&mut vars).is_err());
    }
}
