//! Unique identifiers for ignite entities.

use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unique identifier for one command invocation.
///
/// A fresh id is minted for every resolved plan so log lines from
/// setup, body and teardown of the same run can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvocationId(Ulid);

impl InvocationId {
    /// Generate a new InvocationId
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for InvocationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for InvocationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for InvocationId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
