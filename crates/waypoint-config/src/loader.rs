//! Configuration loader with layered approach.
//!
//! This module provides the [`ConfigLoader`] for loading configuration from
//! multiple sources: defaults, files, and environment variables.

use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::{ConfigError, ObservabilityConfig};
use waypoint_telemetry::LogFormat;

/// Configuration loader with layered approach.
///
/// Later layers override earlier ones:
/// 1. Default values (or a preset)
/// 2. Configuration file or string (TOML or JSON)
/// 3. Environment variables (`PREFIX__SECTION__KEY`)
///
/// # Example
///
/// ```no_run
/// use waypoint_config::ConfigLoader;
///
/// # fn main() -> Result<(), waypoint_config::ConfigError> {
/// let config = ConfigLoader::new()
///     .with_defaults()
///     .with_file("observability.toml")?
///     .with_env_prefix("WAYPOINT")
///     .load()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConfigLoader {
    config: ObservabilityConfig,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ObservabilityConfig::default(),
            env_prefix: None,
        }
    }

    /// Start with default configuration values.
    #[must_use]
    pub fn with_defaults(mut self) -> Self {
        self.config = ObservabilityConfig::default();
        self
    }

    /// Start with the development preset.
    ///
    /// ```
    /// use waypoint_config::{ConfigLoader, LogFormat};
    ///
    /// let config = ConfigLoader::new().with_development().load().unwrap();
    /// assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    /// ```
    #[must_use]
    pub fn with_development(mut self) -> Self {
        self.config = ObservabilityConfig::development();
        self
    }

    /// Start with the production preset.
    #[must_use]
    pub fn with_production(mut self) -> Self {
        self.config = ObservabilityConfig::production();
        self
    }

    /// Load configuration from a file.
    ///
    /// The format follows the extension: `.toml` or `.json`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file is missing, unreadable, malformed,
    /// or contains unknown fields.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::read_error(path, e))?;

        let file_config = Self::parse_file(&content, path)?;
        self.merge_config(file_config);

        Ok(self)
    }

    /// Load configuration from a file if it exists.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file exists but cannot be loaded.
    pub fn with_optional_file<P: AsRef<Path>>(self, path: P) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            self.with_file(path)
        } else {
            Ok(self)
        }
    }

    /// Load configuration from a string in `format` ("toml" or "json").
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if parsing fails.
    ///
    /// # Example
    ///
    /// ```
    /// use waypoint_config::ConfigLoader;
    ///
    /// let toml = r#"
    ///     sample_rate = 0.25
    ///
    ///     [error]
    ///     fallback_status = 404
    /// "#;
    ///
    /// let config = ConfigLoader::new()
    ///     .with_string(toml, "toml")
    ///     .unwrap()
    ///     .load()
    ///     .unwrap();
    ///
    /// assert_eq!(config.error.fallback_status, 404);
    /// assert_eq!(config.error.max_message_length, 200);
    /// ```
    pub fn with_string(mut self, content: &str, format: &str) -> Result<Self, ConfigError> {
        let parsed = match format.to_lowercase().as_str() {
            "toml" => toml::from_str(content)?,
            "json" => serde_json::from_str(content)?,
            _ => {
                return Err(ConfigError::unusable_source(format!(
                    "unsupported configuration format: {format}"
                )))
            }
        };

        self.merge_config(parsed);
        Ok(self)
    }

    /// Set environment variable prefix for overrides.
    ///
    /// Variables use the format `PREFIX__SECTION__KEY`, for example
    /// `WAYPOINT__SAMPLE_RATE=0.1` or `WAYPOINT__ERROR__FALLBACK_STATUS=404`.
    #[must_use]
    pub fn with_env_prefix(mut self, prefix: &str) -> Self {
        self.env_prefix = Some(prefix.to_uppercase());
        self
    }

    /// Load a `.env` file into the process environment, if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a `.env` file exists but cannot be parsed.
    pub fn with_dotenv(self) -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(_) => Ok(self),
            Err(e) if e.not_found() => Ok(self),
            Err(e) => Err(ConfigError::unusable_source(format!("invalid .env file: {e}"))),
        }
    }

    /// Apply environment overrides and validate.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if an override cannot be parsed or the final
    /// configuration is invalid.
    pub fn load(mut self) -> Result<ObservabilityConfig, ConfigError> {
        if let Some(prefix) = self.env_prefix.take() {
            self.apply_env_overrides(&prefix)?;
        }

        self.config.validate()?;

        Ok(self.config)
    }

    /// Finalize without environment overrides or validation.
    #[must_use]
    pub fn load_unvalidated(self) -> ObservabilityConfig {
        self.config
    }

    fn parse_file(content: &str, path: &Path) -> Result<ObservabilityConfig, ConfigError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase);

        match extension.as_deref() {
            Some("toml") => Ok(toml::from_str(content)?),
            Some("json") => Ok(serde_json::from_str(content)?),
            _ => Err(ConfigError::unusable_source(format!(
                "unsupported configuration file format: {}",
                path.display()
            ))),
        }
    }

    // Sections missing from the file were filled with defaults by serde.
    fn merge_config(&mut self, file_config: ObservabilityConfig) {
        self.config = file_config;
    }

    fn apply_env_overrides(&mut self, prefix: &str) -> Result<(), ConfigError> {
        let marker = format!("{prefix}__");
        let mut vars: Vec<(String, String)> =
            env::vars().filter(|(k, _)| k.starts_with(&marker)).collect();
        vars.sort();

        for (key, value) in vars {
            self.apply_env_var(&key, &value, prefix)?;
        }

        Ok(())
    }

    fn apply_env_var(&mut self, key: &str, value: &str, prefix: &str) -> Result<(), ConfigError> {
        let key_without_prefix = key
            .strip_prefix(prefix)
            .and_then(|k| k.strip_prefix("__"))
            .ok_or_else(|| ConfigError::env_override(key, "invalid key format"))?;

        let parts: Vec<&str> = key_without_prefix.split("__").collect();
        let config = &mut self.config;

        match parts.as_slice() {
            ["ENABLED"] => config.enabled = env_bool(key, value)?,
            ["SAMPLE_RATE"] => config.sample_rate = env_parse(key, value, "expected float")?,
            ["INCLUDE_PAYLOAD"] => config.include_payload = env_bool(key, value)?,
            ["MAX_PAYLOAD_LENGTH"] => {
                config.max_payload_length = env_parse(key, value, "expected integer")?;
            }
            ["MASK_SENSITIVE_DATA"] => config.mask_sensitive_data = env_bool(key, value)?,
            ["SENSITIVE_FIELDS"] => {
                config.sensitive_fields = value
                    .split(',')
                    .map(str::trim)
                    .filter(|f| !f.is_empty())
                    .map(String::from)
                    .collect();
            }

            ["REQUEST", "ENABLED"] => config.request.enabled = env_bool(key, value)?,
            ["REQUEST", "INCLUDE_HEADERS"] => config.request.include_headers = env_bool(key, value)?,
            ["REQUEST", "INCLUDE_QUERY_PARAMS"] => {
                config.request.include_query_params = env_bool(key, value)?;
            }
            ["REQUEST", "INCLUDE_CLIENT_INFO"] => {
                config.request.include_client_info = env_bool(key, value)?;
            }

            ["RESPONSE", "ENABLED"] => config.response.enabled = env_bool(key, value)?,
            ["RESPONSE", "INCLUDE_HEADERS"] => {
                config.response.include_headers = env_bool(key, value)?;
            }
            ["RESPONSE", "INCLUDE_TIME_TAKEN"] => {
                config.response.include_time_taken = env_bool(key, value)?;
            }

            ["ERROR", "INCLUDE_STACK_TRACE"] => {
                config.error.include_stack_trace = env_bool(key, value)?;
            }
            ["ERROR", "INCLUDE_REQUEST_DETAILS"] => {
                config.error.include_request_details = env_bool(key, value)?;
            }
            ["ERROR", "FALLBACK_STATUS"] => {
                config.error.fallback_status = env_parse(key, value, "expected status code")?;
            }
            ["ERROR", "MAX_MESSAGE_LENGTH"] => {
                config.error.max_message_length = env_parse(key, value, "expected integer")?;
            }

            ["METRICS", "ENABLED"] => config.metrics.enabled = env_bool(key, value)?,
            ["METRICS", "LOG_SLOW_REQUESTS"] => {
                config.metrics.log_slow_requests = env_bool(key, value)?;
            }
            ["METRICS", "SLOW_REQUEST_THRESHOLD_MS"] => {
                config.metrics.slow_request_threshold_ms =
                    env_parse(key, value, "expected integer")?;
            }

            ["DIAGNOSTIC_KEYS", field] => {
                let keys = &mut config.diagnostic_keys;
                let slot = match *field {
                    "REQUEST_ID" => &mut keys.request_id,
                    "TRACE_ID" => &mut keys.trace_id,
                    "SPAN_ID" => &mut keys.span_id,
                    "USER_ID" => &mut keys.user_id,
                    "SESSION_ID" => &mut keys.session_id,
                    "TENANT_ID" => &mut keys.tenant_id,
                    "OPERATION" => &mut keys.operation,
                    "PATH" => &mut keys.path,
                    "METHOD" => &mut keys.method,
                    _ => return Err(ConfigError::env_override(key, "unknown diagnostic key")),
                };
                *slot = value.to_string();
            }

            ["TELEMETRY", "SERVICE_NAME"] => config.telemetry.service_name = value.to_string(),
            ["TELEMETRY", "LOGGING", "ENABLED"] => {
                config.telemetry.logging.enabled = env_bool(key, value)?;
            }
            ["TELEMETRY", "LOGGING", "LEVEL"] => {
                config.telemetry.logging.level = value.to_string();
            }
            ["TELEMETRY", "LOGGING", "FORMAT"] => {
                config.telemetry.logging.format = match value.to_lowercase().as_str() {
                    "json" => LogFormat::Json,
                    "pretty" => LogFormat::Pretty,
                    _ => {
                        return Err(ConfigError::env_override(
                            key,
                            "expected 'json' or 'pretty'",
                        ))
                    }
                };
            }
            ["TELEMETRY", "METRICS_EXPORTER", "ENABLED"] => {
                config.telemetry.metrics_exporter.enabled = env_bool(key, value)?;
            }
            ["TELEMETRY", "METRICS_EXPORTER", "ADDR"] => {
                config.telemetry.metrics_exporter.addr = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                };
            }

            _ => return Err(ConfigError::env_override(key, "unknown configuration key")),
        }

        Ok(())
    }
}

fn env_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    parse_bool(value).ok_or_else(|| ConfigError::env_override(key, "expected boolean"))
}

fn env_parse<T: FromStr>(key: &str, value: &str, expected: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::env_override(key, expected))
}

/// Parse a boolean value from a string.
///
/// Accepts: true/false, 1/0, yes/no, on/off (case-insensitive)
fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loader_defaults() {
        let config = ConfigLoader::new().with_defaults().load().unwrap();
        assert_eq!(config, ObservabilityConfig::default());
    }

    #[test]
    fn test_loader_with_production() {
        let config = ConfigLoader::new().with_production().load().unwrap();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(!config.include_payload);
    }

    #[test]
    fn test_loader_with_toml_file() {
        let file = file_with(
            ".toml",
            r#"
                sample_rate = 0.5
                sensitive_fields = ["pin"]

                [metrics]
                slow_request_threshold_ms = 250

                [diagnostic_keys]
                request_id = "correlationId"

                [telemetry]
                service_name = "ledger"

                [telemetry.logging]
                format = "pretty"
            "#,
        );

        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert!((config.sample_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(config.sensitive_fields, vec!["pin".to_string()]);
        assert_eq!(config.metrics.slow_request_threshold_ms, 250);
        assert!(config.metrics.log_slow_requests);
        assert_eq!(config.diagnostic_keys.request_id, "correlationId");
        assert_eq!(config.diagnostic_keys.trace_id, "traceId");
        assert_eq!(config.telemetry.service_name, "ledger");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_loader_with_json_file() {
        let file = file_with(".json", r#"{"error": {"max_message_length": 80}}"#);
        let config = ConfigLoader::new().with_file(file.path()).unwrap().load().unwrap();
        assert_eq!(config.error.max_message_length, 80);
    }

    #[test]
    fn test_loader_rejects_unknown_fields() {
        let file = file_with(".toml", "sampling = 0.5");
        assert!(matches!(
            ConfigLoader::new().with_file(file.path()),
            Err(ConfigError::Toml(_))
        ));
    }

    #[test]
    fn test_loader_rejects_unknown_extension() {
        let file = file_with(".yaml", "enabled: true");
        assert!(ConfigLoader::new().with_file(file.path()).is_err());
    }

    #[test]
    fn test_loader_with_file_not_found() {
        assert!(matches!(
            ConfigLoader::new().with_file("/nonexistent/observability.toml"),
            Err(ConfigError::Missing { .. })
        ));
    }

    #[test]
    fn test_loader_with_optional_file_not_found() {
        let config = ConfigLoader::new()
            .with_optional_file("/nonexistent/observability.toml")
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(config.max_payload_length, 10_000);
    }

    #[test]
    fn test_load_validates() {
        let result = ConfigLoader::new()
            .with_string("sample_rate = 2.0", "toml")
            .unwrap()
            .load();
        assert!(result.is_err());

        let unvalidated = ConfigLoader::new()
            .with_string("sample_rate = 2.0", "toml")
            .unwrap()
            .load_unvalidated();
        assert!((unvalidated.sample_rate - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unsupported_string_format() {
        assert!(ConfigLoader::new().with_string("x", "yaml").is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("Off"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_apply_env_var_top_level() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__SAMPLE_RATE", "0.1", "TEST").unwrap();
        loader.apply_env_var("TEST__ENABLED", "false", "TEST").unwrap();
        loader
            .apply_env_var("TEST__SENSITIVE_FIELDS", "pin, cvv ,", "TEST")
            .unwrap();

        assert!((loader.config.sample_rate - 0.1).abs() < f64::EPSILON);
        assert!(!loader.config.enabled);
        assert_eq!(loader.config.sensitive_fields, vec!["pin", "cvv"]);
    }

    #[test]
    fn test_apply_env_var_sections() {
        let mut loader = ConfigLoader::new();
        loader.apply_env_var("TEST__ERROR__FALLBACK_STATUS", "404", "TEST").unwrap();
        loader
            .apply_env_var("TEST__METRICS__SLOW_REQUEST_THRESHOLD_MS", "2500", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__REQUEST__INCLUDE_HEADERS", "no", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__DIAGNOSTIC_KEYS__TENANT_ID", "org", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__TELEMETRY__METRICS_EXPORTER__ADDR", "127.0.0.1:9464", "TEST")
            .unwrap();
        loader
            .apply_env_var("TEST__TELEMETRY__LOGGING__FORMAT", "PRETTY", "TEST")
            .unwrap();

        let config = loader.load_unvalidated();
        assert_eq!(config.error.fallback_status, 404);
        assert_eq!(config.metrics.slow_request_threshold_ms, 2500);
        assert!(!config.request.include_headers);
        assert_eq!(config.diagnostic_keys.tenant_id, "org");
        assert_eq!(
            config.telemetry.metrics_exporter.addr.as_deref(),
            Some("127.0.0.1:9464")
        );
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_apply_env_var_errors() {
        let mut loader = ConfigLoader::new();
        assert!(loader.apply_env_var("TEST__SAMPLE_RATE", "lots", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__METRICS__ENABLED", "maybe", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__DIAGNOSTIC_KEYS__COLOR", "x", "TEST").is_err());
        assert!(loader.apply_env_var("TEST__NOPE", "x", "TEST").is_err());
        assert!(loader.apply_env_var("OTHER__ENABLED", "true", "TEST").is_err());
    }
}
