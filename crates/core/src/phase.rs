//! Uniform phase abstraction for synchronous and asynchronous work.

use std::future::Future;
use std::pin::Pin;

/// A boxed, sendable future borrowing for `'a`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One step of lifecycle work: either already finished or suspended.
///
/// Synchronous units and commands produce [`Phase::Ready`]; asynchronous
/// ones produce [`Phase::Suspended`]. The orchestrator awaits both the same
/// way, so its ordering logic is written once.
pub enum Phase<'a, T> {
    /// The work completed without suspending.
    Ready(T),
    /// The work may yield before completing.
    Suspended(BoxFuture<'a, T>),
}

impl<'a, T> Phase<'a, T> {
    /// Whether this phase can suspend.
    pub fn suspends(&self) -> bool {
        matches!(self, Self::Suspended(_))
    }

    /// Drive the phase to completion.
    pub async fn finish(self) -> T {
        match self {
            Self::Ready(value) => value,
            Self::Suspended(future) => future.await,
        }
    }
}

impl<T> std::fmt::Debug for Phase<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Phase::Ready"),
            Self::Suspended(_) => f.write_str("Phase::Suspended"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_phase_finishes() {
        let phase: Phase<'_, u32> = Phase::Ready(7);
        assert!(!phase.suspends());
        assert_eq!(phase.finish().await, 7);
    }

    #[tokio::test]
    async fn test_suspended_phase_finishes() {
        let phase: Phase<'_, u32> = Phase::Suspended(Box::pin(async {
            tokio::task::yield_now().await;
            11
        }));
        assert!(phase.suspends());
        assert_eq!(phase.finish().await, 11);
    }
}
