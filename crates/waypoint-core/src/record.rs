//! Request lifecycle records.
//!
//! A [`PendingLifecycle`] is captured when a request starts. It is turned
//! into a [`RequestLifecycleRecord`] once, when the request reaches its
//! terminal branch; the finished record has no mutators.

use crate::outcome::OutcomeBucket;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Start-of-request bookkeeping.
///
/// Durations are measured with `tokio::time::Instant`, so a paused test
/// runtime controls them deterministically.
#[derive(Debug, Clone)]
pub struct PendingLifecycle {
    method: String,
    path: String,
    started_at: DateTime<Local>,
    started: Instant,
}

impl PendingLifecycle {
    /// Captures the start of a request.
    #[must_use]
    pub fn start(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            started_at: Local::now(),
            started: Instant::now(),
        }
    }

    /// The request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wall-clock start time.
    #[must_use]
    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    /// Time elapsed since the request started.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Finalizes the record with the terminal status code.
    ///
    /// `slow` is set when the measured duration exceeds `slow_threshold`.
    #[must_use]
    pub fn finish(&self, status_code: u16, slow_threshold: Duration) -> RequestLifecycleRecord {
        let duration = self.elapsed();
        RequestLifecycleRecord {
            method: self.method.clone(),
            path: self.path.clone(),
            start_time: self.started_at,
            duration,
            duration_millis: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
            status_code,
            outcome: OutcomeBucket::from_status_code(status_code),
            slow: duration > slow_threshold,
        }
    }
}

/// The finalized lifecycle of one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLifecycleRecord {
    method: String,
    path: String,
    start_time: DateTime<Local>,
    #[serde(skip)]
    duration: Duration,
    duration_millis: u64,
    status_code: u16,
    outcome: OutcomeBucket,
    slow: bool,
}

impl RequestLifecycleRecord {
    /// The request method.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The raw request path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Wall-clock start time.
    #[must_use]
    pub fn start_time(&self) -> DateTime<Local> {
        self.start_time
    }

    /// Measured duration.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Measured duration in whole milliseconds.
    #[must_use]
    pub fn duration_millis(&self) -> u64 {
        self.duration_millis
    }

    /// Terminal status code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Status-class bucket of the terminal status.
    #[must_use]
    pub fn outcome(&self) -> OutcomeBucket {
        self.outcome
    }

    /// Whether the request exceeded the slow-request threshold.
    #[must_use]
    pub fn is_slow(&self) -> bool {
        self.slow
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: Duration = Duration::from_millis(1000);

    #[tokio::test(start_paused = true)]
    async fn test_fast_request_is_not_slow() {
        let pending = PendingLifecycle::start("GET", "/health");
        tokio::time::sleep(Duration::from_millis(20)).await;

        let record = pending.finish(200, THRESHOLD);
        assert!((20..25).contains(&record.duration_millis()));
        assert_eq!(record.outcome(), OutcomeBucket::Success);
        assert!(!record.is_slow());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_flagged() {
        let pending = PendingLifecycle::start("POST", "/orders");
        tokio::time::sleep(Duration::from_millis(1500)).await;

        let record = pending.finish(201, THRESHOLD);
        assert!(record.duration_millis() >= 1000);
        assert!(record.is_slow());
        assert_eq!(record.method(), "POST");
        assert_eq!(record.path(), "/orders");
    }

    #[tokio::test(start_paused = true)]
    async fn test_just_under_threshold_is_not_slow() {
        let pending = PendingLifecycle::start("GET", "/");
        tokio::time::sleep(Duration::from_millis(990)).await;
        assert!(!pending.finish(200, THRESHOLD).is_slow());
    }

    #[tokio::test]
    async fn test_error_status_bucket() {
        let record = PendingLifecycle::start("GET", "/x").finish(503, THRESHOLD);
        assert_eq!(record.status_code(), 503);
        assert_eq!(record.outcome(), OutcomeBucket::ServerError);
    }
}
