//! Reconnect policy: failure classification and the backoff interval.

use std::time::Duration;

use http::StatusCode;
use parking_lot::RwLock;
use tracing::debug;

use crate::error::EventSourceError;

/// Decide whether a failure should be followed by another connection attempt.
///
/// `last_status` is the status of the response the failure happened on, if a
/// response was received at all. A 204 is the server's request to stop
/// reconnecting and wins over whatever error accompanied it.
pub fn should_reconnect(error: &EventSourceError, last_status: Option<StatusCode>) -> bool {
    match error {
        EventSourceError::ContentType { .. } => false,
        _ if last_status == Some(StatusCode::NO_CONTENT) => false,
        EventSourceError::Truncated => true,
        _ => true,
    }
}

/// The single, server-adjustable reconnection delay of one source.
///
/// Not exponential: every attempt waits the current interval, and each
/// `retry:` directive replaces it outright.
#[derive(Debug)]
pub(crate) struct ReconnectPolicy {
    interval: RwLock<Duration>,
}

impl ReconnectPolicy {
    pub(crate) fn new(initial: Duration) -> Self {
        Self {
            interval: RwLock::new(initial),
        }
    }

    pub(crate) fn retry_interval(&self) -> Duration {
        *self.interval.read()
    }

    pub(crate) fn set_retry_interval(&self, interval: Duration) {
        *self.interval.write() = interval;
        debug!(retry = ?interval, "Reconnect interval updated by server");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_mismatch_is_terminal() {
        let err = EventSourceError::content_type("text/plain", StatusCode::OK);
        assert!(!should_reconnect(&err, Some(StatusCode::OK)));
        assert!(!should_reconnect(&err, None));
    }

    #[test]
    fn test_truncated_is_retried() {
        assert!(should_reconnect(
            &EventSourceError::Truncated,
            Some(StatusCode::OK)
        ));
        assert!(should_reconnect(&EventSourceError::Truncated, None));
    }

    #[test]
    fn test_no_content_is_terminal_regardless_of_error() {
        let status = Some(StatusCode::NO_CONTENT);
        assert!(!should_reconnect(&EventSourceError::StreamEnded, status));
        assert!(!should_reconnect(&EventSourceError::Truncated, status));
        assert!(!should_reconnect(
            &EventSourceError::timeout(Duration::from_secs(1)),
            status
        ));
    }

    #[test]
    fn test_other_errors_are_retried() {
        assert!(should_reconnect(
            &EventSourceError::StreamEnded,
            Some(StatusCode::OK)
        ));
        assert!(should_reconnect(
            &EventSourceError::Status(StatusCode::INTERNAL_SERVER_ERROR),
            Some(StatusCode::INTERNAL_SERVER_ERROR)
        ));
        assert!(should_reconnect(
            &EventSourceError::timeout(Duration::from_secs(1)),
            None
        ));
    }

    #[test]
    fn test_retry_interval_is_overwritten() {
        let policy = ReconnectPolicy::new(Duration::from_millis(1000));
        assert_eq!(policy.retry_interval(), Duration::from_millis(1000));

        policy.set_retry_interval(Duration::from_millis(50));
        assert_eq!(policy.retry_interval(), Duration::from_millis(50));

        policy.set_retry_interval(Duration::from_millis(7000));
        assert_eq!(policy.retry_interval(), Duration::from_millis(7000));
    }
}
