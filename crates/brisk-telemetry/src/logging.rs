//! Structured logging for brisk services.
//!
//! Connection, drain and accept-loop events are emitted with the `tracing`
//! macros. [`init_logging`] installs a `tracing-subscriber` pipeline that
//! writes them as JSON lines or in a human-readable layout.
//!
//! ```rust,ignore
//! use brisk_telemetry::logging::{LogConfig, init_logging};
//!
//! init_logging(&LogConfig::production())?;
//! tracing::info!(addr = %addr, "server listening");
//! ```

use tracing_subscriber::filter::Directive;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::error::TelemetryError;
use crate::TelemetryResult;

/// Directives appended when [`LogConfig::quiet_transport`] is set. The HTTP
/// engine logs every frame at debug level.
const TRANSPORT_DIRECTIVES: [&str; 2] = ["hyper=warn", "hyper_util=warn"];

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Install nothing when false.
    pub enabled: bool,

    /// Filter directives, e.g. `"info"` or `"brisk_server=debug"`.
    pub level: String,

    /// JSON lines instead of the pretty layout.
    pub json_format: bool,

    /// Cap `hyper` and `hyper_util` at `warn` unless `level` names them.
    pub quiet_transport: bool,

    /// Log span close events with their busy/idle timings.
    pub span_events: bool,

    /// Include file, line and thread id on each event.
    pub source_location: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::production()
    }
}

impl LogConfig {
    /// Pretty output at debug level, transport crates included.
    pub fn development() -> Self {
        Self {
            enabled: true,
            level: "debug".to_string(),
            json_format: false,
            quiet_transport: false,
            span_events: true,
            source_location: true,
        }
    }

    /// JSON output at info level.
    pub fn production() -> Self {
        Self {
            enabled: true,
            level: "info".to_string(),
            json_format: true,
            quiet_transport: true,
            span_events: false,
            source_location: false,
        }
    }

    /// Replaces the filter directives.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Builds the filter this configuration describes.
    pub fn filter(&self) -> TelemetryResult<EnvFilter> {
        let mut filter = create_env_filter(&self.level)?;
        if self.quiet_transport {
            for directive in TRANSPORT_DIRECTIVES {
                let target = directive.split('=').next();
                if self
                    .level
                    .split(',')
                    .any(|d| d.trim().split('=').next() == target)
                {
                    continue;
                }
                let parsed: Directive = directive
                    .parse()
                    .map_err(|e| TelemetryError::LoggingInit(format!("{directive}: {e}")))?;
                filter = filter.add_directive(parsed);
            }
        }
        Ok(filter)
    }
}

/// Installs the global logging subscriber.
///
/// Fails with [`TelemetryError::LoggingInit`] when the filter is invalid or a
/// global subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let filter = config.filter()?;
    let fmt = tracing_subscriber::fmt::layer()
        .with_span_events(if config.span_events {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_file(config.source_location)
        .with_line_number(config.source_location)
        .with_thread_ids(config.source_location);

    let layer: Box<dyn Layer<Registry> + Send + Sync> = if config.json_format {
        fmt.json().with_filter(filter).boxed()
    } else {
        fmt.pretty().with_filter(filter).boxed()
    };

    tracing_subscriber::registry()
        .with(layer)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

/// Parses filter directives.
pub fn create_env_filter(directives: &str) -> TelemetryResult<EnvFilter> {
    EnvFilter::try_new(directives)
        .map_err(|e| TelemetryError::LoggingInit(format!("invalid filter {directives:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_is_the_default() {
        let config = LogConfig::default();
        assert_eq!(config, LogConfig::production());
        assert!(config.json_format);
        assert!(config.quiet_transport);
    }

    #[test]
    fn development_keeps_transport_logs() {
        let config = LogConfig::development();
        assert!(!config.quiet_transport);
        assert!(config.source_location);
        assert_eq!(config.level, "debug");
    }

    #[test]
    fn quiet_transport_appends_directives() {
        let filter = LogConfig::production().filter().unwrap().to_string();
        assert!(filter.contains("hyper=warn"));
        assert!(filter.contains("hyper_util=warn"));
    }

    #[test]
    fn explicit_transport_level_wins() {
        let filter = LogConfig::production()
            .with_level("info,hyper=trace")
            .filter()
            .unwrap()
            .to_string();
        assert!(filter.contains("hyper=trace"));
        assert!(!filter.contains("hyper=warn"));
    }

    #[test]
    fn bad_directives_are_rejected() {
        assert!(create_env_filter("brisk_server=debug,hyper=warn").is_ok());
        assert!(matches!(
            LogConfig::production().with_level("brisk=verbose").filter(),
            Err(TelemetryError::LoggingInit(_))
        ));
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let config = LogConfig {
            enabled: false,
            ..LogConfig::default()
        };
        assert!(init_logging(&config).is_ok());
    }
}
