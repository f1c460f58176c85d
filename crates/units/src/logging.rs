//! The `set_log_level` unit and the logging notifier.

use crate::config_file::PARSE_CONFIG;
use crate::vars::VERBOSE;
use ignite_core::{Config, SetupError, Signal, SyncUnit, UnitDescriptor};
use ignite_execution::Notifier;
use tracing::{debug, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Name of the unit.
pub const SET_LOG_LEVEL: &str = "set_log_level";

/// Map a `-v` count to a level.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    }
}

/// Installs the global subscriber. `RUST_LOG` wins over `VERBOSE`.
struct SetLogLevel;

impl SyncUnit for SetLogLevel {
    fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        let level = level_for(VERBOSE.get(config)?);
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.to_string()));

        let installed = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
        if installed.is_err() {
            debug!("Subscriber already installed, keeping it");
        }
        Ok(())
    }
}

/// Build the `set_log_level` unit.
///
/// Ordered after `parse_config` so a config file may set `VERBOSE`.
pub fn set_log_level() -> UnitDescriptor {
    UnitDescriptor::sync(SET_LOG_LEVEL, SetLogLevel)
        .description("Set log level using the -v option")
        .after(PARSE_CONFIG)
}

/// Logs every lifecycle signal.
#[derive(Debug, Default)]
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn notify(&self, signal: Signal, _config: &Config) -> anyhow::Result<()> {
        info!(%signal, "Lifecycle signal");
        Ok(())
    }
}
