//! Status-class buckets.

use serde::{Deserialize, Serialize};

/// Coarse classification of an HTTP status code.
///
/// Codes below 200 are informational and codes of 500 or more are server
/// errors, so every `u16` maps to exactly one bucket.
///
/// # Example
///
/// ```
/// use waypoint_core::OutcomeBucket;
///
/// assert_eq!(OutcomeBucket::from_status_code(204), OutcomeBucket::Success);
/// assert_eq!(OutcomeBucket::from_status_code(404), OutcomeBucket::ClientError);
/// assert_eq!(OutcomeBucket::from_status_code(503).as_str(), "SERVER_ERROR");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeBucket {
    /// 1xx
    Informational,
    /// 2xx
    Success,
    /// 3xx
    Redirection,
    /// 4xx
    ClientError,
    /// 5xx
    ServerError,
}

impl OutcomeBucket {
    /// Buckets a status code.
    #[must_use]
    pub const fn from_status_code(code: u16) -> Self {
        if code < 200 {
            Self::Informational
        } else if code < 300 {
            Self::Success
        } else if code < 400 {
            Self::Redirection
        } else if code < 500 {
            Self::ClientError
        } else {
            Self::ServerError
        }
    }

    /// Lowest status code of the bucket's range.
    #[must_use]
    pub const fn min(self) -> u16 {
        match self {
            Self::Informational => 100,
            Self::Success => 200,
            Self::Redirection => 300,
            Self::ClientError => 400,
            Self::ServerError => 500,
        }
    }

    /// Highest status code of the bucket's range.
    #[must_use]
    pub const fn max(self) -> u16 {
        self.min() + 99
    }

    /// Returns true if `code` lies within `[min, max]`.
    #[must_use]
    pub const fn contains(self, code: u16) -> bool {
        code >= self.min() && code <= self.max()
    }

    /// Returns true for client and server errors.
    #[must_use]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::ClientError | Self::ServerError)
    }

    /// The metric tag value for this bucket.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Informational => "INFORMATIONAL",
            Self::Success => "SUCCESS",
            Self::Redirection => "REDIRECTION",
            Self::ClientError => "CLIENT_ERROR",
            Self::ServerError => "SERVER_ERROR",
        }
    }

    /// All buckets in ascending order.
    #[must_use]
    pub const fn all() -> [Self; 5] {
        [
            Self::Informational,
            Self::Success,
            Self::Redirection,
            Self::ClientError,
            Self::ServerError,
        ]
    }
}

impl std::fmt::Display for OutcomeBucket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<http::StatusCode> for OutcomeBucket {
    fn from(status: http::StatusCode) -> Self {
        Self::from_status_code(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_range_boundaries() {
        assert_eq!(OutcomeBucket::from_status_code(100), OutcomeBucket::Informational);
        assert_eq!(OutcomeBucket::from_status_code(199), OutcomeBucket::Informational);
        assert_eq!(OutcomeBucket::from_status_code(200), OutcomeBucket::Success);
        assert_eq!(OutcomeBucket::from_status_code(299), OutcomeBucket::Success);
        assert_eq!(OutcomeBucket::from_status_code(300), OutcomeBucket::Redirection);
        assert_eq!(OutcomeBucket::from_status_code(399), OutcomeBucket::Redirection);
        assert_eq!(OutcomeBucket::from_status_code(400), OutcomeBucket::ClientError);
        assert_eq!(OutcomeBucket::from_status_code(499), OutcomeBucket::ClientError);
        assert_eq!(OutcomeBucket::from_status_code(500), OutcomeBucket::ServerError);
        assert_eq!(OutcomeBucket::from_status_code(599), OutcomeBucket::ServerError);
    }

    #[test]
    fn test_ranges_are_contiguous() {
        let buckets = OutcomeBucket::all();
        assert_eq!(buckets[0].min(), 100);
        assert_eq!(buckets[4].max(), 599);
        for pair in buckets.windows(2) {
            assert_eq!(pair[0].max() + 1, pair[1].min());
        }
    }

    #[test]
    fn test_tag_values() {
        assert_eq!(OutcomeBucket::ClientError.as_str(), "CLIENT_ERROR");
        assert_eq!(OutcomeBucket::Success.to_string(), "SUCCESS");
        assert!(OutcomeBucket::ServerError.is_error());
        assert!(!OutcomeBucket::Redirection.is_error());
    }

    #[test]
    fn test_from_status() {
        assert_eq!(
            OutcomeBucket::from(http::StatusCode::SERVICE_UNAVAILABLE),
            OutcomeBucket::ServerError
        );
    }

    proptest! {
        #[test]
        fn every_valid_code_lands_in_its_own_range(code in 100u16..=599) {
            let bucket = OutcomeBucket::from_status_code(code);
            prop_assert!(bucket.contains(code));
            let matching = OutcomeBucket::all().iter().filter(|b| b.contains(code)).count();
            prop_assert_eq!(matching, 1);
        }
    }
}
