//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Why an [`ObservabilityConfig`](crate::ObservabilityConfig) could not be
/// produced.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required file does not exist.
    #[error("observability config not found at {path}")]
    Missing {
        /// The path that was looked up.
        path: PathBuf,
    },

    /// A file exists but could not be read.
    #[error("cannot read observability config {path}")]
    Unreadable {
        /// The file.
        path: PathBuf,
        /// I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// A TOML source did not match the schema.
    #[error("malformed TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// A JSON source did not match the schema.
    #[error("malformed JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// A field holds a value outside its allowed range.
    #[error("{field}: {reason}")]
    InvalidValue {
        /// Dotted field path, e.g. `error.fallback_status`.
        field: String,
        /// What is allowed instead.
        reason: String,
    },

    /// An environment override could not be applied.
    #[error("environment override {var} rejected: {reason}")]
    EnvOverride {
        /// Variable name.
        var: String,
        /// What went wrong.
        reason: String,
    },

    /// A source could not be used at all (unknown format, broken `.env`).
    #[error("unusable config source: {0}")]
    Source(String),
}

impl ConfigError {
    /// A required file is missing.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::Missing { path: path.into() }
    }

    /// A file could not be read.
    pub fn read_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Unreadable {
            path: path.into(),
            source,
        }
    }

    /// `field` holds a value outside its allowed range.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Environment variable `var` could not be applied.
    pub fn env_override(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EnvOverride {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// A source could not be used.
    pub fn unusable_source(message: impl Into<String>) -> Self {
        Self::Source(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_names_path() {
        let err = ConfigError::file_not_found("/etc/waypoint/observability.toml");
        assert!(err.to_string().contains("/etc/waypoint/observability.toml"));
    }

    #[test]
    fn test_invalid_value_names_field() {
        let err = ConfigError::invalid_value("sample_rate", "must be between 0.0 and 1.0");
        assert_eq!(err.to_string(), "sample_rate: must be between 0.0 and 1.0");
    }

    #[test]
    fn test_env_override() {
        let err = ConfigError::env_override("WAYPOINT__SAMPLE_RATE", "expected float");
        assert!(err.to_string().contains("WAYPOINT__SAMPLE_RATE"));
        assert!(err.to_string().contains("expected float"));
    }

    #[test]
    fn test_unreadable_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = ConfigError::read_error("/tmp/x.toml", io);
        assert!(std::error::Error::source(&err).is_some());
    }
}
