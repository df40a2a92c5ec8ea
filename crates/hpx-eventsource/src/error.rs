//! Error handling for event sources.

use std::{str::Utf8Error, time::Duration};

use http::StatusCode;
use thiserror::Error;

use crate::parse::EventStreamError;

/// The main result type used throughout the crate.
pub type EventSourceResult<T> = Result<T, EventSourceError>;

/// Every failure an event source can observe.
///
/// None of these are ever delivered through the event stream; whether a
/// failure is retried is decided by
/// [`should_reconnect`](crate::reconnect::should_reconnect).
#[derive(Error, Debug)]
pub enum EventSourceError {
    /// HTTP transport errors (wraps reqwest::Error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The response was not `text/event-stream`
    #[error("Content type error: expected text/event-stream, got {found:?} (status {status})")]
    ContentType { found: String, status: StatusCode },

    /// Non-2xx response carrying the event stream content type
    #[error("Unexpected HTTP status: {0}")]
    Status(StatusCode),

    /// The body ended cleanly on a block boundary
    #[error("Event stream ended")]
    StreamEnded,

    /// The body ended in the middle of a block
    #[error("Event stream truncated mid-block")]
    Truncated,

    /// The body contained invalid UTF-8
    #[error("Event stream is not valid UTF-8: {0}")]
    Utf8(#[from] Utf8Error),

    /// No response headers within the connect timeout
    #[error("Connection attempt timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The consumer dropped its end of the event stream
    #[error("Event consumer dropped")]
    ConsumerGone,

    /// The source was closed while an attempt was in flight
    #[error("Event source closed")]
    Closed,
}

impl EventSourceError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(duration: Duration) -> Self {
        Self::Timeout { duration }
    }

    /// Create a content type error.
    pub fn content_type(found: impl Into<String>, status: StatusCode) -> Self {
        Self::ContentType {
            found: found.into(),
            status,
        }
    }

    /// The HTTP status this error was raised for, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            Self::ContentType { status, .. } => Some(*status),
            Self::Status(status) => Some(*status),
            _ => None,
        }
    }
}

impl From<EventStreamError<reqwest::Error>> for EventSourceError {
    fn from(e: EventStreamError<reqwest::Error>) -> Self {
        match e {
            EventStreamError::Transport(e) => Self::Http(e),
            EventStreamError::Utf8Error(e) => Self::Utf8(e),
            EventStreamError::Truncated => Self::Truncated,
            EventStreamError::Ended => Self::StreamEnded,
        }
    }
}
