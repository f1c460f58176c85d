//! OS termination requests.
//!
//! [`wait_for_shutdown_signal`] completes on SIGINT, SIGTERM or SIGQUIT on
//! Unix, and on Ctrl-C on Windows. The cooperative orchestrator races the
//! command body against it.
//!
//! Synchronous bodies cannot be raced, so the synchronous orchestrator
//! installs a [`TerminationGuard`] instead: a helper thread that listens for
//! the same signals and only raises a flag, which the orchestrator checks
//! between phases.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Signal streams registered up front, so a request that arrives before
/// the first poll is not lost.
pub struct ShutdownListener {
    #[cfg(unix)]
    streams: [tokio::signal::unix::Signal; 3],
    #[cfg(windows)]
    ctrl_c: tokio::signal::windows::CtrlC,
}

impl ShutdownListener {
    /// Register the termination signals. Must be called inside a Tokio
    /// runtime.
    #[cfg(unix)]
    pub fn new() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            streams: [
                signal(SignalKind::interrupt())?,
                signal(SignalKind::terminate())?,
                signal(SignalKind::quit())?,
            ],
        })
    }

    /// Register Ctrl-C. Must be called inside a Tokio runtime.
    #[cfg(windows)]
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            ctrl_c: tokio::signal::windows::ctrl_c()?,
        })
    }

    /// Wait for the next termination request.
    #[cfg(unix)]
    pub async fn recv(&mut self) {
        let [sigint, sigterm, sigquit] = &mut self.streams;
        tokio::select! {
            _ = sigint.recv() => debug!(signal = "SIGINT", "Received signal"),
            _ = sigterm.recv() => debug!(signal = "SIGTERM", "Received signal"),
            _ = sigquit.recv() => debug!(signal = "SIGQUIT", "Received signal"),
        }
    }

    /// Wait for the next termination request.
    #[cfg(windows)]
    pub async fn recv(&mut self) {
        self.ctrl_c.recv().await;
        debug!(signal = "Ctrl-C", "Received signal");
    }
}

/// Wait until the process is asked to terminate.
pub async fn wait_for_shutdown_signal() -> io::Result<()> {
    ShutdownListener::new()?.recv().await;
    Ok(())
}

/// Records termination requests while a synchronous invocation runs.
///
/// Signals are handled on a dedicated thread with its own current-thread
/// runtime, so the invocation itself needs no runtime. Dropping the guard
/// stops the thread. Tokio keeps its process-wide handlers installed after
/// that, so later signals no longer use the default disposition.
pub struct TerminationGuard {
    requested: Arc<AtomicBool>,
    stop: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TerminationGuard {
    /// Start listening. Returns once the signal handlers are registered.
    pub fn install() -> io::Result<Self> {
        let requested = Arc::new(AtomicBool::new(false));
        let (stop, stopped) = oneshot::channel();
        let (armed, is_armed) = mpsc::channel();

        let flag = Arc::clone(&requested);
        let thread = std::thread::Builder::new()
            .name("ignite-signals".to_string())
            .spawn(move || listen(flag, stopped, armed))?;

        let armed = is_armed
            .recv()
            .unwrap_or_else(|_| Err(io::Error::other("signal thread exited before registering handlers")));
        if let Err(err) = armed {
            let _ = thread.join();
            return Err(err);
        }

        Ok(Self {
            requested,
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Whether termination was requested.
    pub fn requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// The flag raised on a termination request.
    pub fn flag(&self) -> &AtomicBool {
        &self.requested
    }
}

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("Signal thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for TerminationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationGuard")
            .field("requested", &self.requested())
            .finish()
    }
}

fn listen(requested: Arc<AtomicBool>, stopped: oneshot::Receiver<()>, armed: mpsc::Sender<io::Result<()>>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            let _ = armed.send(Err(err));
            return;
        }
    };

    runtime.block_on(async move {
        let mut listener = match ShutdownListener::new() {
            Ok(listener) => listener,
            Err(err) => {
                let _ = armed.send(Err(err));
                return;
            }
        };
        let _ = armed.send(Ok(()));

        tokio::select! {
            _ = listener.recv() => {
                requested.store(true, Ordering::SeqCst);
                warn!("Termination requested, stopping after the current phase");
            }
            _ = stopped => {}
        }
    });
}
