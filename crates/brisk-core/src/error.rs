//! Construction-time error types.
//!
//! Every failure that can happen while a client or server is being assembled
//! is a [`ConfigError`]. A constructor that returns one never hands back the
//! partially configured object.

use thiserror::Error;

use crate::body::BoxError;

/// Result type alias using [`ConfigError`].
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while applying options or finalizing a client/server.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// An option needs the built-in base transport, but the client carries a
    /// caller-supplied one.
    #[error("transport is not a configurable base transport (option: {option})")]
    UnsupportedTransport {
        /// The option that required the base transport.
        option: &'static str,
    },

    /// An option received a value it cannot honor.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// The field being configured.
        field: &'static str,
        /// Explanation of why the value is invalid.
        reason: String,
    },

    /// A metric instrument or tracer could not be created.
    #[error("failed to initialize instrumentation: {0}")]
    Instrumentation(#[source] BoxError),
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid_value(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }

    /// Wraps an instrumentation failure.
    pub fn instrumentation(source: impl Into<BoxError>) -> Self {
        Self::Instrumentation(source.into())
    }
}
