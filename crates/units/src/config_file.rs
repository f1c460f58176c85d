//! The `parse_config` unit.

use crate::vars::CONFIG_FILE;
use ignite_core::{Config, SetupError, SyncUnit, UnitDescriptor};
use tracing::debug;

/// Name of the unit.
pub const PARSE_CONFIG: &str = "parse_config";

/// Merges the JSON object file named by `CONFIG` into the configuration.
struct ParseConfig;

impl SyncUnit for ParseConfig {
    fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        let Some(path) = CONFIG_FILE.get(config)? else {
            return Ok(());
        };

        let loaded = config.load_json_file(&path)?;
        debug!(path = %path, keys = loaded, "Loaded config file");
        Ok(())
    }
}

/// Build the `parse_config` unit.
pub fn parse_config() -> UnitDescriptor {
    UnitDescriptor::sync(PARSE_CONFIG, ParseConfig).description("Parse a config file")
}
