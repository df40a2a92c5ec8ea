//! EventSource configuration.

use std::time::Duration;

/// Reconnection delay used until the server sends a `retry:` directive.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(1000);

/// The only response content type an event source accepts.
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Configuration for an [`EventSource`](crate::EventSource).
///
/// Built with chainable setters on top of [`EventSourceConfig::new`].
#[derive(Clone, Debug)]
pub struct EventSourceConfig {
    /// Event stream URL. Fixed for the lifetime of the source.
    pub url: String,
    /// Initial delay before each reconnection attempt; replaced by the
    /// server's `retry:` directives.
    pub retry_interval: Duration,
    /// Timeout for establishing a connection and receiving response headers.
    ///
    /// Reading the body is never timed out.
    pub connect_timeout: Duration,
    /// `Last-Event-ID` to send on the first request, for resuming a previous
    /// subscription. Empty means none.
    pub last_event_id: String,
}

impl Default for EventSourceConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            connect_timeout: Duration::from_secs(10),
            last_event_id: String::new(),
        }
    }
}

impl EventSourceConfig {
    /// Create a new configuration with the given URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the initial reconnection delay.
    #[must_use]
    pub fn retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the connection timeout.
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resume from the given event id.
    #[must_use]
    pub fn last_event_id(mut self, id: impl Into<String>) -> Self {
        self.last_event_id = id.into();
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error message string if any field has an invalid value.
    pub fn validate(&self) -> Result<(), String> {
        if self.url.is_empty() {
            return Err("URL cannot be empty".to_string());
        }
        let url = url::Url::parse(&self.url).map_err(|e| format!("Invalid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("Unsupported URL scheme: {}", url.scheme()));
        }
        if self.connect_timeout.is_zero() {
            return Err("Connect timeout must be > 0".to_string());
        }
        if http::HeaderValue::from_str(&self.last_event_id).is_err() {
            return Err("Last event ID is not a valid header value".to_string());
        }
        Ok(())
    }
}
