//! Stream decoder for `text/event-stream` bodies.
//!
//! Line handling follows the
//! [HTML Living Standard](https://html.spec.whatwg.org/multipage/server-sent-events.html#event-stream-interpretation)
//! (LF / CR / CRLF endings, leading BOM, `:` comments). Blocks are reduced to
//! either a consumer-visible [`MessageEvent`] or a [`Event::Retry`] directive.
//! A fresh [`EventStream`] is bound to every connection and dropped with it.

pub(crate) mod constants;
pub(crate) mod errors;
pub mod event;
pub mod event_stream;
pub(crate) mod parser;

pub use errors::EventStreamError;
pub use event::{Event, MessageEvent};
pub use event_stream::EventStream;
