//! Events decoded from an `text/event-stream` body.

use core::{fmt, time::Duration};

use bytes_utils::Str;

/// A consumer-visible message, decoded from one block of the stream.
///
/// Absent `id` and `event` fields are represented by empty strings.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct MessageEvent {
    /// The block's `id` field.
    pub id: Str,
    /// The block's `event` field (the event name).
    pub name: Str,
    /// All `data` lines of the block, joined with `\n`.
    pub data: Str,
}

impl MessageEvent {
    /// Create a message from its three fields.
    pub fn new(id: impl Into<Str>, name: impl Into<Str>, data: impl Into<Str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            data: data.into(),
        }
    }

    /// The event id, empty when the block carried none.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The event name, empty when the block carried none.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The data payload.
    pub fn data(&self) -> &str {
        &self.data
    }
}

/// Renders the message in wire format, terminated by a blank line.
impl fmt::Display for MessageEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.id.is_empty() {
            writeln!(f, "id: {}", self.id())?;
        }
        if !self.name.is_empty() {
            writeln!(f, "event: {}", self.name())?;
        }
        for line in self.data().split('\n') {
            writeln!(f, "data: {line}")?;
        }
        writeln!(f)
    }
}

/// One decoded protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A message for the consumer.
    Message(MessageEvent),
    /// A `retry:` directive: the new reconnection delay.
    ///
    /// Consumed by the reconnect policy, never handed to the consumer.
    Retry(Duration),
}

impl Event {
    /// Returns the message, if this is one.
    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            Self::Message(message) => Some(message),
            Self::Retry(_) => None,
        }
    }

    /// Returns `true` if this is a retry directive.
    pub fn is_retry(&self) -> bool {
        matches!(self, Self::Retry(_))
    }
}

impl From<MessageEvent> for Event {
    fn from(message: MessageEvent) -> Self {
        Self::Message(message)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Message(message) => fmt::Display::fmt(message, f),
            Self::Retry(delay) => write!(f, "retry: {}\n\n", delay.as_millis()),
        }
    }
}
