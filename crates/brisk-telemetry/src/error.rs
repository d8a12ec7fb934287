//! Telemetry error types.

use brisk_core::ConfigError;
use thiserror::Error;

/// Errors that can occur during telemetry operations.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// A metric instrument name does not satisfy the instrument naming rules.
    #[error("Invalid instrument name {name:?}: {reason}")]
    InvalidInstrumentName {
        /// The rejected name.
        name: String,
        /// Which rule the name breaks.
        reason: &'static str,
    },

    /// Failed to initialize logging.
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),
}

impl From<TelemetryError> for ConfigError {
    fn from(err: TelemetryError) -> Self {
        ConfigError::instrumentation(err)
    }
}
