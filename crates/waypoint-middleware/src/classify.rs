//! Failure classification.
//!
//! [`ErrorClassifier::classify`] turns a [`RequestFailure`] into the status,
//! outcome bucket and client-facing message of the error response:
//!
//! | Failure | Status |
//! |---|---|
//! | `Status` | the carried status, reason used verbatim |
//! | `Validation` | 400 |
//! | `NotFound` | 404 |
//! | `Application` | the configured fallback (500 unless overridden) |
//! | `TransportClosed` | 499 |
//! | `Unrecognized` | 500 |

use http::StatusCode;
use waypoint_config::ErrorLogConfig;
use waypoint_core::{OutcomeBucket, RequestFailure};
use waypoint_telemetry::sanitize::truncate_chars;

/// Nonstandard status for a client that went away before the response.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

const ELLIPSIS: &str = "...";

/// The classified outcome of a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    /// Response status.
    pub status: StatusCode,
    /// Status-class bucket of `status`.
    pub outcome: OutcomeBucket,
    /// Reason phrase for the `error` envelope field.
    pub reason_phrase: String,
    /// Sanitized client-facing message.
    pub message: String,
    /// The failure's kind name.
    pub kind: String,
}

/// Maps failures to HTTP outcomes.
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    fallback_status: StatusCode,
    max_message_length: usize,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Creates a classifier with a 500 fallback and 200-character messages.
    #[must_use]
    pub fn new() -> Self {
        Self {
            fallback_status: StatusCode::INTERNAL_SERVER_ERROR,
            max_message_length: 200,
        }
    }

    /// Creates a classifier from the `error` configuration section.
    #[must_use]
    pub fn from_config(config: &ErrorLogConfig) -> Self {
        Self::new()
            .fallback_status(config.fallback_status)
            .max_message_length(config.max_message_length)
    }

    /// Sets the status for recognized application failures.
    ///
    /// Values outside 400..=599 are ignored.
    #[must_use]
    pub fn fallback_status(mut self, status: u16) -> Self {
        if let Ok(status) = StatusCode::from_u16(status) {
            if status.is_client_error() || status.is_server_error() {
                self.fallback_status = status;
            }
        }
        self
    }

    /// Sets the longest client-facing message, in characters.
    #[must_use]
    pub fn max_message_length(mut self, max: usize) -> Self {
        self.max_message_length = max;
        self
    }

    /// Classifies `failure`.
    #[must_use]
    pub fn classify(&self, failure: &RequestFailure) -> Classification {
        let status = self.status_for(failure);
        Classification {
            status,
            outcome: OutcomeBucket::from_status_code(status.as_u16()),
            reason_phrase: reason_phrase(status).to_string(),
            message: self.message_for(failure),
            kind: failure.kind_name().to_string(),
        }
    }

    fn status_for(&self, failure: &RequestFailure) -> StatusCode {
        match failure {
            RequestFailure::Status { status, .. } => *status,
            RequestFailure::Validation { .. } => StatusCode::BAD_REQUEST,
            RequestFailure::NotFound { .. } => StatusCode::NOT_FOUND,
            RequestFailure::Application { .. } => self.fallback_status,
            RequestFailure::TransportClosed => {
                StatusCode::from_u16(CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
            }
            RequestFailure::Unrecognized { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message_for(&self, failure: &RequestFailure) -> String {
        let explicit = failure
            .reason()
            .map(str::to_string)
            .or_else(|| failure.message())
            .filter(|m| !m.trim().is_empty());

        let message =
            explicit.unwrap_or_else(|| format!("An error occurred: {}", failure.kind_name()));
        truncate_chars(&message, self.max_message_length, ELLIPSIS)
    }
}

/// Returns the reason phrase for `status`.
#[must_use]
pub fn reason_phrase(status: StatusCode) -> &'static str {
    match status.as_u16() {
        CLIENT_CLOSED_REQUEST => "Client Closed Request",
        _ => status.canonical_reason().unwrap_or("Unknown Status"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_explicit_status_and_reason_verbatim() {
        let classifier = ErrorClassifier::new();
        let failure = RequestFailure::status_with_reason(StatusCode::CONFLICT, "version mismatch");

        let c = classifier.classify(&failure);
        assert_eq!(c.status, StatusCode::CONFLICT);
        assert_eq!(c.outcome, OutcomeBucket::ClientError);
        assert_eq!(c.reason_phrase, "Conflict");
        assert_eq!(c.message, "version mismatch");
    }

    #[test]
    fn test_validation_maps_to_400() {
        let c = ErrorClassifier::new().classify(&RequestFailure::validation("invalid amount"));
        assert_eq!(c.status, StatusCode::BAD_REQUEST);
        assert_eq!(c.reason_phrase, "Bad Request");
        assert_eq!(c.message, "invalid amount");
        assert_eq!(c.kind, "ValidationError");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let c = ErrorClassifier::new().classify(&RequestFailure::not_found("no such account"));
        assert_eq!(c.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_application_uses_fallback() {
        let failure = RequestFailure::application("InsufficientFunds", "balance too low");

        let c = ErrorClassifier::new().classify(&failure);
        assert_eq!(c.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(c.outcome, OutcomeBucket::ServerError);

        let c = ErrorClassifier::new().fallback_status(404).classify(&failure);
        assert_eq!(c.status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_fallback_ignores_non_error_status() {
        let failure = RequestFailure::application("Odd", "x");
        let c = ErrorClassifier::new().fallback_status(204).classify(&failure);
        assert_eq!(c.status, StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_unrecognized_maps_to_500() {
        let failure: RequestFailure = std::io::Error::other("disk full").into();
        let c = ErrorClassifier::new().fallback_status(404).classify(&failure);
        assert_eq!(c.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(c.message, "disk full");
    }

    #[test]
    fn test_transport_closed() {
        let c = ErrorClassifier::new().classify(&RequestFailure::TransportClosed);
        assert_eq!(c.status.as_u16(), 499);
        assert_eq!(c.reason_phrase, "Client Closed Request");
        assert_eq!(c.outcome, OutcomeBucket::ClientError);
        assert_eq!(c.message, "An error occurred: TransportClosed");
    }

    #[test]
    fn test_blank_message_is_synthesized() {
        let failure = RequestFailure::validation("   ");
        let c = ErrorClassifier::new().classify(&failure);
        assert_eq!(c.message, "An error occurred: ValidationError");

        let c = ErrorClassifier::new().classify(&RequestFailure::status(StatusCode::GONE));
        assert_eq!(c.message, "An error occurred: ResponseStatusError");
    }

    #[test]
    fn test_long_message_truncated_to_200() {
        let failure = RequestFailure::validation("x".repeat(250));
        let c = ErrorClassifier::new().classify(&failure);
        assert_eq!(c.message.chars().count(), 200);
        assert!(c.message.ends_with("..."));
        assert_eq!(&c.message[..197], "x".repeat(197));
    }

    #[test]
    fn test_from_config() {
        let config = ErrorLogConfig {
            fallback_status: 404,
            max_message_length: 10,
            ..ErrorLogConfig::default()
        };
        let classifier = ErrorClassifier::from_config(&config);
        let c = classifier.classify(&RequestFailure::application("Missing", "gone for good"));
        assert_eq!(c.status, StatusCode::NOT_FOUND);
        assert_eq!(c.message, "gone fo...");
    }

    proptest! {
        #[test]
        fn message_never_exceeds_limit(message in "\\PC{0,400}") {
            let c = ErrorClassifier::new().classify(&RequestFailure::validation(message.clone()));
            prop_assert!(c.message.chars().count() <= 200);
            if message.chars().count() <= 200 && !message.trim().is_empty() {
                prop_assert_eq!(c.message, message);
            }
        }
    }
}
