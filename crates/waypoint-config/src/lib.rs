//! Typed configuration for Waypoint.
//!
//! This crate provides the [`ObservabilityConfig`] consumed by the pipeline
//! builder, with support for:
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use waypoint_config::ConfigLoader;
//!
//! # fn main() -> Result<(), waypoint_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_optional_file("observability.toml")?
//!     .with_env_prefix("WAYPOINT")
//!     .load()?;
//!
//! println!("slow requests over {:?}", config.slow_request_threshold());
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! enabled = true
//! sample_rate = 1.0
//! include_payload = true
//! max_payload_length = 10000
//! mask_sensitive_data = true
//! sensitive_fields = ["password", "ssn", "creditCard", "secret", "token", "authorization"]
//!
//! [request]
//! include_headers = true
//! include_query_params = true
//! include_client_info = true
//!
//! [response]
//! include_time_taken = true
//!
//! [error]
//! include_stack_trace = true
//! fallback_status = 500
//! max_message_length = 200
//!
//! [metrics]
//! log_slow_requests = true
//! slow_request_threshold_ms = 1000
//!
//! [diagnostic_keys]
//! request_id = "requestId"
//! trace_id = "traceId"
//!
//! [telemetry]
//! service_name = "ledger"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [telemetry.metrics_exporter]
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `WAYPOINT__SAMPLE_RATE=0.1`
//! - `WAYPOINT__SENSITIVE_FIELDS=password,pin`
//! - `WAYPOINT__ERROR__FALLBACK_STATUS=404`
//! - `WAYPOINT__TELEMETRY__LOGGING__LEVEL=debug`

#![doc(html_root_url = "https://docs.rs/waypoint-config/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::ObservabilityConfig;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use schema::*;
pub use waypoint_core::DiagnosticKeys;
pub use waypoint_telemetry::LogFormat;
