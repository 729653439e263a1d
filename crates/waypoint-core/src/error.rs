//! Request failure taxonomy.
//!
//! Handlers report failures as [`RequestFailure`]. The classifier in the
//! middleware crate turns each variant into an HTTP status, and the lifecycle
//! recorder logs it with its complete source chain.
//!
//! | Variant | Default status |
//! |---|---|
//! | `Status` | the carried status |
//! | `Validation` | 400 |
//! | `NotFound` | 404 |
//! | `Application` | configurable fallback (500) |
//! | `TransportClosed` | 499 |
//! | `Unrecognized` | 500 |

use http::StatusCode;
use std::error::Error as StdError;
use thiserror::Error;

/// Result type alias using [`RequestFailure`].
pub type FailureResult<T> = Result<T, RequestFailure>;

/// A failure raised while processing a request.
///
/// # Example
///
/// ```
/// use waypoint_core::RequestFailure;
///
/// fn parse_amount(raw: &str) -> Result<u64, RequestFailure> {
///     raw.parse().map_err(|_| RequestFailure::validation("invalid amount"))
/// }
///
/// let err = parse_amount("ten").unwrap_err();
/// assert_eq!(err.message().as_deref(), Some("invalid amount"));
/// assert_eq!(err.kind_name(), "ValidationError");
/// ```
#[derive(Error, Debug)]
pub enum RequestFailure {
    /// The failure already carries an HTTP status.
    #[error("request failed with status {status}")]
    Status {
        /// The status to respond with.
        status: StatusCode,
        /// Client-facing reason, used verbatim when present.
        reason: Option<String>,
        /// Longer description.
        message: Option<String>,
    },

    /// Bad input or a violated precondition.
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable error message.
        message: String,
    },

    /// The addressed resource does not exist.
    #[error("resource not found")]
    NotFound {
        /// Optional description of the missing resource.
        message: Option<String>,
    },

    /// A recognized application failure without an explicit status.
    #[error("{kind}: {message}")]
    Application {
        /// Stable name of the failure kind.
        kind: String,
        /// Human-readable error message.
        message: String,
    },

    /// The client disconnected before the response was produced.
    #[error("client closed the connection before the response was ready")]
    TransportClosed,

    /// Any other error.
    #[error("{source}")]
    Unrecognized {
        /// Short type name of the original error.
        kind: String,
        /// The original error.
        #[source]
        source: anyhow::Error,
    },
}

impl RequestFailure {
    /// Creates a failure with an explicit status and no reason.
    pub fn status(status: StatusCode) -> Self {
        Self::Status {
            status,
            reason: None,
            message: None,
        }
    }

    /// Creates a failure with an explicit status and client-facing reason.
    pub fn status_with_reason(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::Status {
            status,
            reason: Some(reason.into()),
            message: None,
        }
    }

    /// Creates a validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a not-found failure.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: Some(message.into()),
        }
    }

    /// Creates a recognized application failure.
    pub fn application(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Application {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Wraps an arbitrary error, remembering its type name.
    pub fn unrecognized<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::Unrecognized {
            kind: short_type_name(std::any::type_name::<E>()).to_string(),
            source: anyhow::Error::new(error),
        }
    }

    /// Returns the status carried by a [`RequestFailure::Status`].
    #[must_use]
    pub fn explicit_status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the explicit client-facing reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Status { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    /// Returns the failure's own message, if it has one.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Status { message, .. } | Self::NotFound { message } => message.clone(),
            Self::Validation { message } | Self::Application { message, .. } => {
                Some(message.clone())
            }
            Self::TransportClosed => None,
            Self::Unrecognized { source, .. } => Some(source.to_string()),
        }
    }

    /// Stable type-like name used for the `exception` metric tag.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Status { .. } => "ResponseStatusError",
            Self::Validation { .. } => "ValidationError",
            Self::NotFound { .. } => "NotFoundError",
            Self::Application { kind, .. } | Self::Unrecognized { kind, .. } => kind,
            Self::TransportClosed => "TransportClosed",
        }
    }

    /// Returns true if the client went away.
    #[must_use]
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed)
    }

    /// Renders the failure and all of its sources, outermost first.
    #[must_use]
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut current = self.source();
        while let Some(err) = current {
            let text = err.to_string();
            if chain.last() != Some(&text) {
                chain.push(text);
            }
            current = err.source();
        }
        chain
    }
}

impl From<anyhow::Error> for RequestFailure {
    fn from(source: anyhow::Error) -> Self {
        Self::Unrecognized {
            kind: "Error".to_string(),
            source,
        }
    }
}

impl From<std::io::Error> for RequestFailure {
    fn from(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::BrokenPipe | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted => {
                Self::TransportClosed
            }
            _ => Self::unrecognized(error),
        }
    }
}

/// Strips the module path and generic arguments from a type name.
///
/// ```
/// assert_eq!(waypoint_core::short_type_name("std::io::error::Error"), "Error");
/// assert_eq!(waypoint_core::short_type_name("app::Wrapper<core::Inner>"), "Wrapper");
/// ```
#[must_use]
pub fn short_type_name(full: &str) -> &str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
