//! Server errors.

use std::io;
use std::time::Duration;

use brisk_core::ConfigError;
use thiserror::Error;
use tokio::task::JoinError;

use crate::shutdown::Signal;

/// Errors returned while building or running a [`Server`](crate::Server).
#[derive(Debug, Error)]
pub enum ServerError {
    /// The options could not be applied.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Binding or accepting failed. The server stopped without draining.
    #[error("server error: {0}")]
    Listener(#[source] io::Error),

    /// The OS signal handlers could not be installed.
    #[error("could not install signal handlers: {0}")]
    Signal(#[source] io::Error),

    /// In-flight connections did not finish within the grace period.
    #[error("could not stop server gracefully: connections still open after {grace:?} (signal: {signal})")]
    DrainTimeout {
        /// The grace period that elapsed.
        grace: Duration,
        /// The signal that started the shutdown.
        signal: Signal,
    },

    /// The drain itself failed.
    #[error("could not stop server gracefully: {source} (signal: {signal})")]
    DrainFailed {
        /// Why the drain failed.
        #[source]
        source: JoinError,
        /// The signal that started the shutdown.
        signal: Signal,
    },
}

impl ServerError {
    /// Returns `true` when the server stopped because the listener failed.
    pub fn is_listener(&self) -> bool {
        matches!(self, Self::Listener(_))
    }
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
