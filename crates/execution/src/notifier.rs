//! Lifecycle signal dispatch.

use ignite_core::{Config, Signal};
use std::sync::Arc;
use tracing::{debug, warn};

/// Receives lifecycle signals.
pub trait Notifier: Send + Sync {
    /// Get notifier name, used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Deliver a signal.
    fn notify(&self, signal: Signal, config: &Config) -> anyhow::Result<()>;
}

/// Notifiers a signal is fanned out to, in registration order.
#[derive(Clone, Default)]
pub struct NotifierSet {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl NotifierSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a notifier.
    pub fn push(&mut self, notifier: impl Notifier + 'static) {
        self.notifiers.push(Arc::new(notifier));
    }

    /// Number of notifiers.
    pub fn len(&self) -> usize {
        self.notifiers.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.notifiers.is_empty()
    }

    /// Deliver `signal` to every notifier.
    ///
    /// Failures are logged and never abort the run. Returns the number of
    /// notifiers that failed.
    pub fn dispatch(&self, signal: Signal, config: &Config) -> usize {
        let mut failed = 0;
        for notifier in &self.notifiers {
            match notifier.notify(signal, config) {
                Ok(()) => debug!(notifier = notifier.name(), %signal, "Signal delivered"),
                Err(e) => {
                    failed += 1;
                    warn!(notifier = notifier.name(), %signal, "Signal delivery failed: {:#}", e);
                }
            }
        }
        failed
    }
}

impl std::fmt::Debug for NotifierSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.notifiers.iter().map(|n| n.name()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Notifier for Recorder {
        fn notify(&self, signal: Signal, _config: &Config) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(signal.to_string());
            Ok(())
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn notify(&self, _signal: Signal, _config: &Config) -> anyhow::Result<()> {
            anyhow::bail!("socket closed")
        }
    }

    #[test]
    fn test_dispatch_reaches_every_notifier() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut set = NotifierSet::new();
        set.push(Broken);
        set.push(Recorder(Arc::clone(&events)));

        let config = Config::new();
        assert_eq!(set.dispatch(Signal::Ready, &config), 1);
        assert_eq!(set.dispatch(Signal::Stopping, &config), 1);

        assert_eq!(*events.lock().unwrap(), vec!["ready", "stopping"]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_default_name_is_type_name() {
        let recorder = Recorder(Arc::default());
        assert!(recorder.name().ends_with("Recorder"));
    }
}
