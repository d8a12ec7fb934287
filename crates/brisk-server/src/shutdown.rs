//! Shutdown signals and the lifecycle observed while a server runs.
//!
//! ```text
//! Running ──signal──▶ Draining ──drained──▶ Stopped(Graceful)
//!    │                    └─────grace up───▶ Stopped(Timeout)
//!    └──listener error──────────────────────▶ Stopped(ListenerError)
//! ```

use std::fmt;
use std::future::Future;
use std::io;

/// An OS signal that asks the server to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// SIGINT, or Ctrl+C where SIGINT does not exist.
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupt => f.write_str("SIGINT"),
            Self::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Why a server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every connection finished within the grace period.
    Graceful,
    /// The grace period elapsed; remaining connections were dropped.
    Timeout,
    /// The drain task failed.
    Failed,
    /// The listener failed; nothing was drained.
    ListenerError,
}

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting connections.
    Running,
    /// A signal arrived; no new connections, waiting for open ones.
    Draining {
        /// The signal that started the drain.
        signal: Signal,
    },
    /// Terminal.
    Stopped(StopReason),
}

impl ShutdownState {
    /// Returns `true` once the server has stopped for any reason.
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

/// Installs SIGINT and SIGTERM handlers and returns a future resolving to
/// the first one received.
///
/// Registration happens before this returns, so a failure to install the
/// handlers is reported here instead of when the future is polled.
#[cfg(unix)]
pub fn os_signal() -> io::Result<impl Future<Output = Signal> + Send> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;

    Ok(async move {
        let received = tokio::select! {
            _ = interrupt.recv() => Signal::Interrupt,
            _ = terminate.recv() => Signal::Terminate,
        };
        tracing::info!(signal = %received, "shutdown signal received");
        received
    })
}

/// Installs the Ctrl+C handler and returns a future resolving when it fires.
#[cfg(not(unix))]
pub fn os_signal() -> io::Result<impl Future<Output = Signal> + Send> {
    Ok(async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!(signal = %Signal::Interrupt, "shutdown signal received");
                Signal::Interrupt
            }
            Err(err) => {
                tracing::error!(error = %err, "waiting for Ctrl+C failed");
                std::future::pending().await
            }
        }
    })
}
