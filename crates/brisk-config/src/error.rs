//! Errors raised while layering and validating settings.
//!
//! Each variant names the layer it came from: a settings file, an inline
//! string, a `PREFIX__SECTION__KEY` environment override, or the final
//! validation pass.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Where a settings layer came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layer {
    /// A file passed to [`SettingsLoader::with_file`](crate::SettingsLoader::with_file).
    File(PathBuf),
    /// A string passed to [`SettingsLoader::with_string`](crate::SettingsLoader::with_string).
    Inline,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "settings file {}", path.display()),
            Self::Inline => f.write_str("inline settings"),
        }
    }
}

/// Why settings could not be loaded.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A required settings file does not exist.
    #[error("settings file {} does not exist", .0.display())]
    Missing(PathBuf),

    /// A settings file exists but reading it failed.
    #[error("could not read settings file {}", .path.display())]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// The I/O failure.
        #[source]
        source: io::Error,
    },

    /// A layer's format is neither `toml` nor `json`.
    #[error("{layer} has format {format:?}; expected toml or json")]
    UnknownFormat {
        /// The offending layer.
        layer: Layer,
        /// The format as given, lowercased.
        format: String,
    },

    /// A layer did not deserialize: bad syntax, a wrong type or an unknown
    /// field.
    #[error("{layer} is not valid settings: {source}")]
    Malformed {
        /// The offending layer.
        layer: Layer,
        /// The TOML or JSON error.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An environment override could not be converted.
    #[error("environment override {var}={value:?} is not {expected}")]
    BadOverride {
        /// The variable name.
        var: String,
        /// The raw value.
        value: String,
        /// What the field needs, e.g. `"an integer"`.
        expected: &'static str,
    },

    /// The merged settings failed validation.
    #[error("settings field {field} {reason}")]
    Invalid {
        /// Dotted path of the field, e.g. `server.read_timeout_ms`.
        field: String,
        /// What is wrong with it.
        reason: String,
    },
}

impl SettingsError {
    pub(crate) fn unreadable(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(
        layer: Layer,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Malformed {
            layer,
            source: Box::new(source),
        }
    }

    pub(crate) fn bad_override(var: &str, value: &str, expected: &'static str) -> Self {
        Self::BadOverride {
            var: var.to_string(),
            value: value.to_string(),
            expected,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The file involved, when the error came from a settings file.
    pub fn path(&self) -> Option<&std::path::Path> {
        match self {
            Self::Missing(path)
            | Self::Unreadable { path, .. }
            | Self::UnknownFormat {
                layer: Layer::File(path),
                ..
            }
            | Self::Malformed {
                layer: Layer::File(path),
                ..
            } => Some(path.as_path()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_names_the_path() {
        let err = SettingsError::Missing("/etc/brisk/settings.toml".into());
        assert_eq!(
            err.to_string(),
            "settings file /etc/brisk/settings.toml does not exist"
        );
        assert_eq!(
            err.path(),
            Some(std::path::Path::new("/etc/brisk/settings.toml"))
        );
    }

    #[test]
    fn override_shows_variable_and_value() {
        let err = SettingsError::bad_override("BRISK__SERVER__IDLE_TIMEOUT_MS", "2s", "an integer");
        assert_eq!(
            err.to_string(),
            "environment override BRISK__SERVER__IDLE_TIMEOUT_MS=\"2s\" is not an integer"
        );
        assert_eq!(err.path(), None);
    }

    #[test]
    fn invalid_field_reads_as_a_sentence() {
        let err = SettingsError::invalid("client.timeout_ms", "must be greater than zero");
        assert_eq!(
            err.to_string(),
            "settings field client.timeout_ms must be greater than zero"
        );
    }

    #[test]
    fn unknown_format_names_the_layer() {
        let err = SettingsError::UnknownFormat {
            layer: Layer::Inline,
            format: "yaml".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "inline settings has format \"yaml\"; expected toml or json"
        );
    }
}
