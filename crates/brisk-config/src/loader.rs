//! Layered settings loader.
//!
//! Layers apply in order, later ones overriding earlier ones field by field:
//! 1. Defaults (every field unset)
//! 2. Settings files or strings (TOML or JSON)
//! 3. Environment variables `PREFIX__SECTION__KEY`

use std::env;
use std::fs;
use std::path::Path;

use crate::error::Layer;
use crate::{Settings, SettingsError};

/// Settings loader with a layered approach.
///
/// # Example
///
/// ```no_run
/// use brisk_config::SettingsLoader;
///
/// # fn main() -> Result<(), brisk_config::SettingsError> {
/// let settings = SettingsLoader::new()
///     .with_optional_file("brisk.toml")?
///     .with_env_prefix("BRISK")
///     .load()?;
/// let client_opts = settings.client.options();
/// # let _ = client_opts;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct SettingsLoader {
    settings: Settings,
    env_prefix: Option<String>,
}

impl SettingsLoader {
    /// Create a loader with every field unset.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overlay a settings file. The format follows the extension (`.toml`
    /// or `.json`).
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SettingsError::Missing(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| SettingsError::unreadable(path, e))?;
        let format = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        self.settings
            .merge(parse(&content, format, Layer::File(path.to_path_buf()))?);
        tracing::debug!(path = %path.display(), "loaded settings file");
        Ok(self)
    }

    /// Like [`with_file`](Self::with_file), but a missing file is skipped.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, SettingsError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Overlay settings from a string in `format` (`"toml"` or `"json"`).
    ///
    /// ```
    /// use brisk_config::SettingsLoader;
    ///
    /// let settings = SettingsLoader::new()
    ///     .with_string("[server]\nread_timeout_ms = 750", "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    /// assert_eq!(settings.server.read_timeout_ms, Some(750));
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, SettingsError> {
        self.settings.merge(parse(content, format, Layer::Inline)?);
        Ok(self)
    }

    /// Read overrides from `PREFIX__SECTION__KEY` variables when loading.
    ///
    /// For example, with prefix `"BRISK"`:
    /// - `BRISK__CLIENT__TIMEOUT_MS=1000`
    /// - `BRISK__SERVER__ADDR=127.0.0.1:9000`
    /// - `BRISK__LOGGING__JSON=false`
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Applies environment overrides from the process environment and
    /// validates the result.
    pub fn load(self) -> Result<Settings, SettingsError> {
        self.load_with_vars(env::vars())
    }

    /// Like [`load`](Self::load), reading overrides from `vars` instead of
    /// the process environment.
    pub fn load_with_vars<I>(mut self, vars: I) -> Result<Settings, SettingsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        if let Some(prefix) = self.env_prefix.take() {
            let scope = format!("{prefix}__");
            for (key, value) in vars {
                if let Some(path) = key.strip_prefix(&scope) {
                    apply_env_var(&mut self.settings, &key, path, &value)?;
                }
            }
        }

        self.settings.validate()?;
        Ok(self.settings)
    }

    /// Returns the settings without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> Settings {
        self.settings
    }
}

fn parse(content: &str, format: &str, layer: Layer) -> Result<Settings, SettingsError> {
    match format.to_lowercase().as_str() {
        "toml" => toml::from_str(content).map_err(|e| SettingsError::malformed(layer, e)),
        "json" => serde_json::from_str(content).map_err(|e| SettingsError::malformed(layer, e)),
        other => Err(SettingsError::UnknownFormat {
            layer,
            format: other.to_string(),
        }),
    }
}

fn apply_env_var(
    settings: &mut Settings,
    key: &str,
    path: &str,
    value: &str,
) -> Result<(), SettingsError> {
    let parts: Vec<&str> = path.split("__").collect();
    let client = &mut settings.client;
    let server = &mut settings.server;
    let logging = &mut settings.logging;

    match parts.as_slice() {
        ["CLIENT", "TIMEOUT_MS"] => client.timeout_ms = Some(parse_int(key, value)?),
        ["CLIENT", "CONNECT_TIMEOUT_MS"] => client.connect_timeout_ms = Some(parse_int(key, value)?),
        ["CLIENT", "TLS_HANDSHAKE_TIMEOUT_MS"] => {
            client.tls_handshake_timeout_ms = Some(parse_int(key, value)?);
        }
        ["CLIENT", "RESPONSE_HEADER_TIMEOUT_MS"] => {
            client.response_header_timeout_ms = Some(parse_int(key, value)?);
        }
        ["CLIENT", "IDLE_CONN_TIMEOUT_MS"] => {
            client.idle_conn_timeout_ms = Some(parse_int(key, value)?);
        }
        ["CLIENT", "EXPECT_CONTINUE_TIMEOUT_MS"] => {
            client.expect_continue_timeout_ms = Some(parse_int(key, value)?);
        }
        ["CLIENT", "MAX_IDLE_CONNS"] => client.max_idle_conns = Some(parse_int(key, value)?),

        ["SERVER", "ADDR"] => {
            server.addr = Some(
                value
                    .parse()
                    .map_err(|_| SettingsError::bad_override(key, value, "a socket address"))?,
            );
        }
        ["SERVER", "READ_TIMEOUT_MS"] => server.read_timeout_ms = Some(parse_int(key, value)?),
        ["SERVER", "WRITE_TIMEOUT_MS"] => server.write_timeout_ms = Some(parse_int(key, value)?),
        ["SERVER", "IDLE_TIMEOUT_MS"] => server.idle_timeout_ms = Some(parse_int(key, value)?),
        ["SERVER", "SHUTDOWN_GRACE_PERIOD_MS"] => {
            server.shutdown_grace_period_ms = Some(parse_int(key, value)?);
        }

        ["LOGGING", "LEVEL"] => logging.level = Some(value.to_string()),
        ["LOGGING", "JSON"] => {
            logging.json = Some(
                parse_bool(value)
                    .ok_or_else(|| SettingsError::bad_override(key, value, "a boolean"))?,
            );
        }

        _ => tracing::debug!(var = key, "ignoring unknown settings variable"),
    }

    Ok(())
}

fn parse_int<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, SettingsError> {
    value
        .parse()
        .map_err(|_| SettingsError::bad_override(key, value, "an integer"))
}

/// Parse a boolean from a string.
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
