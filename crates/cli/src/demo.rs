//! Demo units: a clock and a heartbeat.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ignite_core::{AsyncUnit, Config, ConfigVar, SetupError, SyncUnit, UnitDescriptor};
use ignite_execution::{RegistryError, UnitRegistry};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Name of the clock unit.
pub const CLOCK: &str = "clock";

/// Name of the heartbeat unit.
pub const HEARTBEAT: &str = "heartbeat";

/// When the clock unit was entered.
pub static STARTED_AT: ConfigVar<Option<DateTime<Utc>>> =
    ConfigVar::new("STARTED_AT", "When the clock unit was set up", Some(None));

/// Heartbeat period.
pub static HEARTBEAT_INTERVAL_MS: ConfigVar<u64> = ConfigVar::new(
    "HEARTBEAT_INTERVAL_MS",
    "Milliseconds between heartbeats",
    Some(1000),
);

/// Records the start time and logs the elapsed time on teardown.
struct Clock;

impl SyncUnit for Clock {
    fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        let now = Utc::now();
        STARTED_AT.set(config, Some(now))?;
        debug!(started_at = %now, "Clock started");
        Ok(())
    }

    fn teardown(&self, config: &mut Config) -> anyhow::Result<()> {
        let started = STARTED_AT.get(config)?.context("clock was never started")?;
        let elapsed = Utc::now() - started;
        info!(elapsed_ms = elapsed.num_milliseconds(), "Clock stopped");
        config.remove(STARTED_AT.name());
        Ok(())
    }
}

/// Background ticker owned by the heartbeat unit.
pub struct Heartbeat {
    beats: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Beats counted so far.
    pub fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }
}

/// Spawns a ticker on setup and stops it on teardown.
struct HeartbeatUnit;

#[async_trait]
impl AsyncUnit for HeartbeatUnit {
    async fn setup(&self, config: &mut Config) -> Result<(), SetupError> {
        let period = Duration::from_millis(HEARTBEAT_INTERVAL_MS.get(config)?.max(1));
        let beats = Arc::new(AtomicU64::new(0));

        let counter = Arc::clone(&beats);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                interval.tick().await;
                let n = counter.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(beat = n, "Heartbeat");
            }
        });

        config.insert_extension(Heartbeat { beats, task });
        Ok(())
    }

    async fn teardown(&self, config: &mut Config) -> anyhow::Result<()> {
        let Heartbeat { beats, task } = config
            .remove_extension::<Heartbeat>()
            .context("heartbeat was never started")?;
        task.abort();
        let _ = task.await;
        info!(beats = beats.load(Ordering::Relaxed), "Heartbeat stopped");
        Ok(())
    }
}

/// Build the `clock` unit.
pub fn clock() -> UnitDescriptor {
    UnitDescriptor::sync(CLOCK, Clock).description("Record when the program started")
}

/// Build the `heartbeat` unit.
pub fn heartbeat() -> UnitDescriptor {
    UnitDescriptor::asynchronous(HEARTBEAT, HeartbeatUnit)
        .description("Tick in the background while a command runs")
        .depends_on(CLOCK)
}

/// Register the demo units.
pub fn register(registry: &mut UnitRegistry) -> Result<(), RegistryError> {
    registry.register(clock())?;
    registry.register(heartbeat())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_clock_round_trip() {
        let unit = clock();
        let mut config = Config::new();

        unit.behavior.setup(&mut config).finish().await.unwrap();
        assert!(STARTED_AT.get(&config).unwrap().is_some());

        unit.behavior.teardown(&mut config).finish().await.unwrap();
        assert!(!STARTED_AT.is_set(&config));
    }

    #[tokio::test]
    async fn test_clock_teardown_without_setup_fails() {
        let unit = clock();
        let err = unit.behavior.teardown(&mut Config::new()).finish().await.unwrap_err();
        assert!(err.to_string().contains("never started"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_ticks_until_teardown() {
        let unit = heartbeat();
        let mut config = Config::new();
        HEARTBEAT_INTERVAL_MS.set(&mut config, 10).unwrap();

        unit.behavior.setup(&mut config).finish().await.unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        let beats = config.extension::<Heartbeat>().unwrap().beats();
        assert!(beats >= 2, "only {beats} beats");

        unit.behavior.teardown(&mut config).finish().await.unwrap();
        assert!(config.extension::<Heartbeat>().is_none());
    }

    #[test]
    fn test_register() {
        let mut registry = UnitRegistry::new();
        register(&mut registry).unwrap();
        assert_eq!(
            registry.get(HEARTBEAT).unwrap().dependencies,
            vec![ignite_core::UnitName::from(CLOCK)]
        );
    }
}
