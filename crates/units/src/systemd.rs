//! Service-manager readiness notifications.
//!
//! Sends `READY=1` and `STOPPING=1` datagrams to the socket named by
//! `$NOTIFY_SOCKET` when `SYSTEMD_NOTIFY` is enabled.

use crate::vars::SYSTEMD_NOTIFY;
use ignite_core::{Config, Signal};
use ignite_execution::Notifier;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable holding the notification socket.
pub const NOTIFY_SOCKET: &str = "NOTIFY_SOCKET";

/// Notifies systemd about lifecycle signals.
#[derive(Debug, Clone, Default)]
pub struct SystemdNotifier {
    socket: Option<PathBuf>,
}

impl SystemdNotifier {
    /// Read the socket path from `$NOTIFY_SOCKET`.
    pub fn from_env() -> Self {
        Self {
            socket: std::env::var_os(NOTIFY_SOCKET).map(PathBuf::from),
        }
    }

    /// Use an explicit socket path.
    pub fn with_socket(path: impl Into<PathBuf>) -> Self {
        Self {
            socket: Some(path.into()),
        }
    }

    /// Socket path, if any.
    pub fn socket(&self) -> Option<&Path> {
        self.socket.as_deref()
    }
}

/// State line sent for `signal`.
pub fn message(signal: Signal) -> &'static str {
    match signal {
        Signal::Ready => "READY=1",
        Signal::Stopping => "STOPPING=1",
    }
}

impl Notifier for SystemdNotifier {
    fn name(&self) -> &str {
        "systemd"
    }

    fn notify(&self, signal: Signal, config: &Config) -> anyhow::Result<()> {
        if !SYSTEMD_NOTIFY.get(config)? {
            return Ok(());
        }
        let Some(socket) = &self.socket else {
            debug!("{} is not set, skipping notification", NOTIFY_SOCKET);
            return Ok(());
        };

        send(socket, message(signal))
    }
}

#[cfg(unix)]
fn send(socket: &Path, state: &str) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::os::unix::net::UnixDatagram;

    let sender = UnixDatagram::unbound().context("failed to create notification socket")?;

    // `@name` addresses the abstract namespace.
    #[cfg(target_os = "linux")]
    if let Some(name) = socket.to_str().and_then(|s| s.strip_prefix('@')) {
        use std::os::linux::net::SocketAddrExt;
        use std::os::unix::net::SocketAddr;

        let addr = SocketAddr::from_abstract_name(name.as_bytes())?;
        sender
            .send_to_addr(state.as_bytes(), &addr)
            .with_context(|| format!("failed to notify {}", socket.display()))?;
        return Ok(());
    }

    sender
        .send_to(state.as_bytes(), socket)
        .with_context(|| format!("failed to notify {}", socket.display()))?;
    Ok(())
}

#[cfg(not(unix))]
fn send(_socket: &Path, _state: &str) -> anyhow::Result<()> {
    Ok(())
}
