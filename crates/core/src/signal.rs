//! Lifecycle signals dispatched around the command body.

use serde::{Deserialize, Serialize};

/// A named lifecycle notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    /// Every unit is entered; the command body is about to run.
    Ready,
    /// The command body returned or failed; teardown is about to run.
    Stopping,
}

impl Signal {
    /// Get the wire name of the signal.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Stopping => "stopping",
        }
    }
}

impl std::fmt::Display for Signal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
