//! Errors produced while decoding an event stream.

use core::{
    fmt::{Display, Formatter},
    str::Utf8Error,
};

/// Errors produced by [`EventStream`](super::event_stream::EventStream).
#[derive(Debug, PartialEq)]
pub enum EventStreamError<E> {
    /// The underlying byte stream failed.
    Transport(E),
    /// A field value was not valid UTF-8.
    Utf8Error(Utf8Error),
    /// The byte stream ended in the middle of a block.
    Truncated,
    /// The byte stream ended cleanly on a block boundary.
    ///
    /// Only returned by [`EventStream::decode`](super::event_stream::EventStream::decode);
    /// the [`Stream`](futures_core::Stream) impl yields `None` instead.
    Ended,
}

impl<E> EventStreamError<E> {
    /// Returns `true` if the stream ended mid-block.
    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated)
    }

    /// Returns `true` if the stream ended on a block boundary.
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Ended)
    }
}

impl<E> From<Utf8Error> for EventStreamError<E> {
    fn from(value: Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}

impl<E> Display for EventStreamError<E>
where
    E: Display,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Transport(e) => e.fmt(f),
            Self::Utf8Error(e) => e.fmt(f),
            Self::Truncated => f.write_str("event stream ended in the middle of a block"),
            Self::Ended => f.write_str("event stream ended"),
        }
    }
}

impl<E> core::error::Error for EventStreamError<E> where E: core::error::Error {}
