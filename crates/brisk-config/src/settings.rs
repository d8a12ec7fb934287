//! Settings sections and their conversion into option lists.
//!
//! Every field is optional. A field left unset produces no option, so the
//! factory defaults still apply to it.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use brisk_client::{
    with_connect_timeout, with_expect_continue_timeout, with_idle_conn_timeout,
    with_max_idle_conns, with_response_header_timeout, with_timeout,
    with_tls_handshake_timeout, Client,
};
use brisk_core::Opt;
use brisk_server::{
    with_idle_timeout, with_read_timeout, with_shutdown_grace_period, with_write_timeout, Server,
};
use brisk_telemetry::logging::create_env_filter;
use brisk_telemetry::LogConfig;
use serde::{Deserialize, Serialize};

use crate::SettingsError;

/// Address used when no server address is configured.
pub const DEFAULT_SERVER_ADDR: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 8080));

/// All settings.
///
/// # Example
///
/// ```toml
/// [client]
/// timeout_ms = 1000
/// connect_timeout_ms = 200
///
/// [server]
/// addr = "0.0.0.0:9000"
/// shutdown_grace_period_ms = 10000
///
/// [logging]
/// level = "info,brisk_server=debug"
/// json = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Outbound client settings.
    #[serde(default)]
    pub client: ClientSettings,

    /// Inbound server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl Settings {
    /// Overlays every field set in `other` onto `self`.
    pub fn merge(&mut self, other: Settings) {
        self.client.merge(other.client);
        self.server.merge(other.server);
        self.logging.merge(other.logging);
    }

    /// Rejects zero durations and invalid log filters.
    pub fn validate(&self) -> Result<(), SettingsError> {
        self.client.validate()?;
        self.server.validate()?;
        self.logging.validate()
    }
}

/// Client settings, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientSettings {
    /// Total request timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Connect timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// TLS handshake timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tls_handshake_timeout_ms: Option<u64>,
    /// Response header timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_header_timeout_ms: Option<u64>,
    /// Idle pooled connection timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_conn_timeout_ms: Option<u64>,
    /// Expect-continue timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_continue_timeout_ms: Option<u64>,
    /// Maximum idle pooled connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_idle_conns: Option<usize>,
}

impl ClientSettings {
    fn merge(&mut self, other: ClientSettings) {
        overlay(&mut self.timeout_ms, other.timeout_ms);
        overlay(&mut self.connect_timeout_ms, other.connect_timeout_ms);
        overlay(&mut self.tls_handshake_timeout_ms, other.tls_handshake_timeout_ms);
        overlay(
            &mut self.response_header_timeout_ms,
            other.response_header_timeout_ms,
        );
        overlay(&mut self.idle_conn_timeout_ms, other.idle_conn_timeout_ms);
        overlay(
            &mut self.expect_continue_timeout_ms,
            other.expect_continue_timeout_ms,
        );
        overlay(&mut self.max_idle_conns, other.max_idle_conns);
    }

    fn validate(&self) -> Result<(), SettingsError> {
        positive("client.timeout_ms", self.timeout_ms)?;
        positive("client.connect_timeout_ms", self.connect_timeout_ms)?;
        positive("client.tls_handshake_timeout_ms", self.tls_handshake_timeout_ms)?;
        positive(
            "client.response_header_timeout_ms",
            self.response_header_timeout_ms,
        )?;
        positive("client.idle_conn_timeout_ms", self.idle_conn_timeout_ms)?;
        positive(
            "client.expect_continue_timeout_ms",
            self.expect_continue_timeout_ms,
        )
    }

    /// Options for the fields that are set, to pass to
    /// [`new_client`](brisk_client::new_client).
    pub fn options(&self) -> Vec<Opt<Client>> {
        let mut opts = Vec::new();
        if let Some(ms) = self.timeout_ms {
            opts.push(with_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.connect_timeout_ms {
            opts.push(with_connect_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.tls_handshake_timeout_ms {
            opts.push(with_tls_handshake_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.response_header_timeout_ms {
            opts.push(with_response_header_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.idle_conn_timeout_ms {
            opts.push(with_idle_conn_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.expect_continue_timeout_ms {
            opts.push(with_expect_continue_timeout(Duration::from_millis(ms)));
        }
        if let Some(max) = self.max_idle_conns {
            opts.push(with_max_idle_conns(max));
        }
        opts
    }
}

/// Server settings, durations in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Listen address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub addr: Option<SocketAddr>,
    /// Request header read timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_timeout_ms: Option<u64>,
    /// Response write timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_timeout_ms: Option<u64>,
    /// Keep-alive idle timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idle_timeout_ms: Option<u64>,
    /// Shutdown grace period.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_grace_period_ms: Option<u64>,
}

impl ServerSettings {
    fn merge(&mut self, other: ServerSettings) {
        overlay(&mut self.addr, other.addr);
        overlay(&mut self.read_timeout_ms, other.read_timeout_ms);
        overlay(&mut self.write_timeout_ms, other.write_timeout_ms);
        overlay(&mut self.idle_timeout_ms, other.idle_timeout_ms);
        overlay(&mut self.shutdown_grace_period_ms, other.shutdown_grace_period_ms);
    }

    fn validate(&self) -> Result<(), SettingsError> {
        positive("server.read_timeout_ms", self.read_timeout_ms)?;
        positive("server.write_timeout_ms", self.write_timeout_ms)?;
        positive("server.idle_timeout_ms", self.idle_timeout_ms)?;
        positive(
            "server.shutdown_grace_period_ms",
            self.shutdown_grace_period_ms,
        )
    }

    /// The configured address, or [`DEFAULT_SERVER_ADDR`].
    pub fn addr(&self) -> SocketAddr {
        self.addr.unwrap_or(DEFAULT_SERVER_ADDR)
    }

    /// Options for the fields that are set, to pass to
    /// [`new_server`](brisk_server::new_server).
    pub fn options(&self) -> Vec<Opt<Server>> {
        let mut opts = Vec::new();
        if let Some(ms) = self.read_timeout_ms {
            opts.push(with_read_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.write_timeout_ms {
            opts.push(with_write_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.idle_timeout_ms {
            opts.push(with_idle_timeout(Duration::from_millis(ms)));
        }
        if let Some(ms) = self.shutdown_grace_period_ms {
            opts.push(with_shutdown_grace_period(Duration::from_millis(ms)));
        }
        opts
    }
}

/// Logging settings layered over [`LogConfig::production`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    /// Filter directives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    /// JSON output instead of human-readable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub json: Option<bool>,
}

impl LoggingSettings {
    fn merge(&mut self, other: LoggingSettings) {
        overlay(&mut self.level, other.level);
        overlay(&mut self.json, other.json);
    }

    fn validate(&self) -> Result<(), SettingsError> {
        if let Some(level) = &self.level {
            create_env_filter(level)
                .map_err(|err| SettingsError::invalid("logging.level", err.to_string()))?;
        }
        Ok(())
    }

    /// The logging configuration to pass to
    /// [`init_logging`](brisk_telemetry::init_logging).
    pub fn log_config(&self) -> LogConfig {
        let mut config = LogConfig::production();
        if let Some(level) = &self.level {
            config.level.clone_from(level);
        }
        if let Some(json) = self.json {
            config.json_format = json;
        }
        config
    }
}

fn overlay<T>(current: &mut Option<T>, incoming: Option<T>) {
    if incoming.is_some() {
        *current = incoming;
    }
}

fn positive(field: &str, value: Option<u64>) -> Result<(), SettingsError> {
    match value {
        Some(0) => Err(SettingsError::invalid(field, "must be greater than zero")),
        _ => Ok(()),
    }
}
