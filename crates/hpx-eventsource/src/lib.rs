//! # hpx-eventsource
//!
//! EventSource client for Server-Sent Events streams.
//!
//! Opens a long-lived `GET` against a `text/event-stream` endpoint, decodes the
//! body into events and hands them to a single consumer, reconnecting
//! transparently when the connection drops. Behaves like the HTML5
//! `EventSource`:
//!
//! - **Content-type validation**: anything but `text/event-stream` closes the
//!   source for good.
//! - **Last-Event-ID replay**: the id of the last delivered message is sent on
//!   every reconnect.
//! - **Server-directed retry**: a `retry:` directive replaces the reconnect
//!   delay (1000 ms until the server says otherwise).
//! - **HTTP 204**: the server's signal to stop reconnecting.
//!
//! # Architecture
//!
//! ```text
//! EventSource::connect(url)
//!   ├─ connect_once ──(transient)──► sleep(retry) ─► connect_once ...
//!   └─ spawns background task ──► tokio::spawn(drive)
//!        │                           │ EventStream::decode()
//!        │                           ├─ Retry    → ReconnectPolicy
//!        └── MessageStream ◄─ mpsc ◄─┴─ Message  (acked hand-off)
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hpx_eventsource::EventSource;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut source = EventSource::connect("https://example.com/events").await?;
//!
//! while let Some(message) = source.next_event().await {
//!     println!("id={} event={} data={}", message.id(), message.name(), message.data());
//! }
//! println!("closed: {}", source.ready_state());
//! # Ok(())
//! # }
//! ```
//!
//! # Module Index
//!
//! | Module | Description |
//! |--------|-------------|
//! | `config` | [`EventSourceConfig`] builder |
//! | [`connection`] | [`EventSource`], [`EventSourceHandle`], [`MessageStream`] |
//! | [`error`] | [`EventSourceError`] |
//! | [`parse`] | [`EventStream`] decoder, [`Event`], [`MessageEvent`] |
//! | [`reconnect`] | [`should_reconnect`] failure classification |
//! | `types` | [`ReadyState`] |

mod config;
pub mod connection;
pub mod error;
pub mod parse;
pub mod reconnect;
mod types;

pub use config::{DEFAULT_RETRY_INTERVAL, EVENT_STREAM_CONTENT_TYPE, EventSourceConfig};
pub use connection::{EventSource, EventSourceHandle, MessageStream};
pub use error::{EventSourceError, EventSourceResult};
pub use parse::{Event, EventStream, EventStreamError, MessageEvent};
pub use reconnect::should_reconnect;
pub use types::ReadyState;
