//! EventSource connection manager.
//!
//! Provides [`EventSource`], [`EventSourceHandle`] and [`MessageStream`].
//! One background task per source decodes the response body, applies
//! `retry:` directives, hands messages to the consumer one at a time and
//! reconnects after transient failures.

use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll, ready},
    time::Duration,
};

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream::BoxStream};
use http::{HeaderValue, StatusCode, header};
use parking_lot::{Mutex, RwLock};
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::{sleep, timeout},
};
use tracing::{debug, error, info, warn};

use crate::{
    config::{EVENT_STREAM_CONTENT_TYPE, EventSourceConfig},
    error::{EventSourceError, EventSourceResult},
    parse::{Event, EventStream, MessageEvent},
    reconnect::{ReconnectPolicy, should_reconnect},
    types::ReadyState,
};

type BodyStream = BoxStream<'static, reqwest::Result<Bytes>>;

// ---------------------------------------------------------------------------
// Public API: EventSource
// ---------------------------------------------------------------------------

/// A Server-Sent Events subscription.
///
/// Created with [`connect()`](EventSource::connect) or
/// [`with_config()`](EventSource::with_config). Implements [`Stream`] over
/// the delivered [`MessageEvent`]s; [`split()`](EventSource::split) separates
/// the clonable control handle from the single-consumer stream.
pub struct EventSource {
    handle: EventSourceHandle,
    stream: MessageStream,
}

impl EventSource {
    /// Open an event source on `url` with default settings.
    ///
    /// # Errors
    ///
    /// See [`with_config()`](EventSource::with_config).
    pub async fn connect(url: impl Into<String>) -> EventSourceResult<Self> {
        Self::with_config(EventSourceConfig::new(url)).await
    }

    /// Open an event source.
    ///
    /// Resolves once the first connection is open. Transient failures,
    /// including on the very first attempt, are retried after the current
    /// retry interval with no attempt limit.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the connection
    /// fails terminally (content type mismatch, HTTP 204). The source is
    /// `Closed` in that case.
    pub async fn with_config(config: EventSourceConfig) -> EventSourceResult<Self> {
        config.validate().map_err(EventSourceError::config)?;

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;

        // Capacity 1 plus a per-message ack makes every send a rendezvous.
        let (event_tx, event_rx) = mpsc::channel(1);
        let shared = Arc::new(Shared::new(config, client, event_tx));

        let connection = match shared.connect_once().await {
            Ok(connection) => connection,
            Err(err) if should_reconnect(&err, err.status()) => {
                warn!(url = %shared.url(), error = %err, "EventSource connection failed, retrying");
                match shared.reconnect().await {
                    Ok(connection) => connection,
                    Err(err) => {
                        shared.close();
                        return Err(err);
                    }
                }
            }
            Err(err) => {
                error!(url = %shared.url(), error = %err, "EventSource connection failed");
                shared.close();
                return Err(err);
            }
        };

        tokio::spawn(drive(Arc::clone(&shared), connection));

        Ok(Self {
            handle: EventSourceHandle { shared },
            stream: MessageStream { rx: event_rx },
        })
    }

    /// Split into a control handle and the message stream.
    pub fn split(self) -> (EventSourceHandle, MessageStream) {
        (self.handle, self.stream)
    }

    /// Get a reference to the control handle.
    pub fn handle(&self) -> &EventSourceHandle {
        &self.handle
    }

    /// The event stream URL.
    pub fn url(&self) -> &str {
        self.handle.url()
    }

    /// Snapshot of the ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.handle.ready_state()
    }

    /// Id of the most recently delivered message that carried one.
    pub fn last_event_id(&self) -> String {
        self.handle.last_event_id()
    }

    /// Close the source. See [`EventSourceHandle::close`].
    pub fn close(&self) -> bool {
        self.handle.close()
    }

    /// Receive the next message, or `None` once the source is closed.
    pub async fn next_event(&mut self) -> Option<MessageEvent> {
        self.stream.next_event().await
    }
}

impl Stream for EventSource {
    type Item = MessageEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        Pin::new(&mut this.stream).poll_next(cx)
    }
}

// ---------------------------------------------------------------------------
// EventSourceHandle
// ---------------------------------------------------------------------------

/// Clone-able handle for inspecting and closing an [`EventSource`].
#[derive(Clone)]
pub struct EventSourceHandle {
    shared: Arc<Shared>,
}

impl EventSourceHandle {
    /// The event stream URL.
    pub fn url(&self) -> &str {
        self.shared.url()
    }

    /// Snapshot of the ready state.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    /// Id of the most recently delivered message that carried one.
    pub fn last_event_id(&self) -> String {
        self.shared.last_event_id.read().clone()
    }

    /// Current delay before the next reconnection attempt.
    pub fn retry_interval(&self) -> Duration {
        self.shared.policy.retry_interval()
    }

    /// Close the source for good.
    ///
    /// Releases the transport, ends the message stream and moves to
    /// [`ReadyState::Closed`]. Safe to call concurrently: exactly one caller
    /// performs the teardown and gets `true`, every other call is a no-op
    /// returning `false`.
    pub fn close(&self) -> bool {
        self.shared.close()
    }
}

// ---------------------------------------------------------------------------
// MessageStream
// ---------------------------------------------------------------------------

/// A message plus the acknowledgement the producer waits on.
struct Delivery {
    message: MessageEvent,
    ack: oneshot::Sender<()>,
}

/// Single-consumer stream of [`MessageEvent`]s.
///
/// The background task is suspended on each message until it is received
/// here, so a slow consumer throttles decoding instead of buffering. Ends
/// once the source is closed.
pub struct MessageStream {
    rx: mpsc::Receiver<Delivery>,
}

impl MessageStream {
    /// Receive the next message, or `None` once the source is closed.
    pub async fn next_event(&mut self) -> Option<MessageEvent> {
        self.next().await
    }
}

impl Stream for MessageStream {
    type Item = MessageEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match ready!(this.rx.poll_recv(cx)) {
                // A failed ack means the producer gave up on this message.
                Some(Delivery { message, ack }) => {
                    if ack.send(()).is_ok() {
                        return Poll::Ready(Some(message));
                    }
                }
                None => return Poll::Ready(None),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Internal: shared connection state
// ---------------------------------------------------------------------------

/// Ownership of the open response body.
///
/// Dropping it wakes the task reading that body, which then drops the body
/// and exits.
struct TransportHandle {
    _release: oneshot::Sender<()>,
}

/// One open connection, owned by the background task.
struct Connection {
    events: EventStream<BodyStream>,
    status: StatusCode,
    released: oneshot::Receiver<()>,
}

/// How a hand-off to the consumer ended.
#[derive(Debug, PartialEq, Eq)]
enum Handoff {
    Delivered,
    /// The transport was released first. `delivered` is set if the consumer
    /// had already taken the message.
    Released { delivered: bool },
}

enum Outcome {
    /// The transport was released by `close()`.
    Released,
    Failed(EventSourceError),
}

struct Shared {
    config: EventSourceConfig,
    client: reqwest::Client,
    ready_state: RwLock<ReadyState>,
    last_event_id: RwLock<String>,
    policy: ReconnectPolicy,
    transport: Mutex<Option<TransportHandle>>,
    events: Mutex<Option<mpsc::Sender<Delivery>>>,
    shutdown: watch::Sender<bool>,
}

impl Shared {
    fn new(
        config: EventSourceConfig,
        client: reqwest::Client,
        events: mpsc::Sender<Delivery>,
    ) -> Self {
        Self {
            last_event_id: RwLock::new(config.last_event_id.clone()),
            policy: ReconnectPolicy::new(config.retry_interval),
            config,
            client,
            ready_state: RwLock::new(ReadyState::Connecting),
            transport: Mutex::new(None),
            events: Mutex::new(Some(events)),
            shutdown: watch::Sender::new(false),
        }
    }

    fn url(&self) -> &str {
        &self.config.url
    }

    fn ready_state(&self) -> ReadyState {
        *self.ready_state.read()
    }

    /// Move to `Connecting` or `Open`. Refused once teardown has been
    /// claimed, so `Closing` and `Closed` are never left.
    fn set_ready_state(&self, state: ReadyState) -> bool {
        let mut current = self.ready_state.write();
        if current.is_shutting_down() {
            return false;
        }
        *current = state;
        true
    }

    /// Compare-and-claim: only the first caller moves the source to
    /// `Closing`.
    fn claim_closing(&self) -> bool {
        let mut current = self.ready_state.write();
        if current.is_shutting_down() {
            return false;
        }
        *current = ReadyState::Closing;
        true
    }

    /// Resolves once `close()` has been claimed.
    async fn closed(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let _ = shutdown.wait_for(|closed| *closed).await;
    }

    fn release_transport(&self) {
        let handle = self.transport.lock().take();
        drop(handle);
    }

    fn close(&self) -> bool {
        if !self.claim_closing() {
            return false;
        }
        self.shutdown.send_replace(true);
        self.release_transport();
        *self.ready_state.write() = ReadyState::Closed;
        // Last, so a consumer seeing the stream end also sees `Closed`.
        let events = self.events.lock().take();
        drop(events);
        info!(url = %self.url(), "EventSource closed");
        true
    }

    /// A single connection attempt.
    async fn connect_once(&self) -> EventSourceResult<Connection> {
        let last_event_id = self.last_event_id.read().clone();
        info!(url = %self.url(), last_event_id = %last_event_id, "EventSource connecting");

        let mut request = self
            .client
            .get(self.url())
            .header(
                header::ACCEPT,
                HeaderValue::from_static(EVENT_STREAM_CONTENT_TYPE),
            )
            .header(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

        if !last_event_id.is_empty() {
            match HeaderValue::from_str(&last_event_id) {
                Ok(value) => request = request.header("last-event-id", value),
                Err(_) => warn!(
                    last_event_id = %last_event_id,
                    "Last-Event-ID is not a valid header value, not sending it"
                ),
            }
        }

        if self.ready_state().is_shutting_down() {
            return Err(EventSourceError::Closed);
        }
        let response = tokio::select! {
            biased;

            _ = self.closed() => return Err(EventSourceError::Closed),
            sent = timeout(self.config.connect_timeout, request.send()) => sent
                .map_err(|_| EventSourceError::timeout(self.config.connect_timeout))??,
        };

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_owned();

        if !is_event_stream(&content_type) {
            // Release the connection before reporting the mismatch.
            drop(response);
            return Err(EventSourceError::content_type(content_type, status));
        }
        if !status.is_success() {
            drop(response);
            return Err(EventSourceError::Status(status));
        }

        let (release, released) = oneshot::channel();
        *self.transport.lock() = Some(TransportHandle { _release: release });

        if !self.set_ready_state(ReadyState::Open) {
            // Closed while the request was in flight.
            self.release_transport();
            return Err(EventSourceError::Closed);
        }

        info!(url = %self.url(), status = %status, "EventSource connection established");
        Ok(Connection {
            events: EventStream::new(response.bytes_stream().boxed()),
            status,
            released,
        })
    }

    /// Wait the current retry interval and try again, until a connection
    /// opens or a failure is terminal.
    async fn reconnect(&self) -> EventSourceResult<Connection> {
        loop {
            if !self.set_ready_state(ReadyState::Connecting) {
                return Err(EventSourceError::Closed);
            }

            let delay = self.policy.retry_interval();
            warn!(url = %self.url(), ?delay, "EventSource reconnecting after delay");
            tokio::select! {
                biased;

                _ = self.closed() => return Err(EventSourceError::Closed),
                _ = sleep(delay) => {}
            }

            match self.connect_once().await {
                Ok(connection) => return Ok(connection),
                Err(EventSourceError::Closed) => return Err(EventSourceError::Closed),
                Err(err) if should_reconnect(&err, err.status()) => {
                    error!(url = %self.url(), error = %err, "EventSource reconnect failed");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Decode and deliver until the connection fails or is released.
    async fn consume(&self, connection: &mut Connection) -> Outcome {
        loop {
            let decoded = tokio::select! {
                biased;

                _ = &mut connection.released => return Outcome::Released,
                decoded = connection.events.decode() => decoded,
            };

            match decoded {
                Ok(Event::Retry(delay)) => self.policy.set_retry_interval(delay),
                Ok(Event::Message(message)) => {
                    debug!(id = message.id(), name = message.name(), "EventSource message received");
                    let id = message.id.clone();
                    match self.deliver(message, &mut connection.released).await {
                        Ok(Handoff::Delivered) => self.record_event_id(&id),
                        Ok(Handoff::Released { delivered }) => {
                            if delivered {
                                self.record_event_id(&id);
                            }
                            return Outcome::Released;
                        }
                        Err(err) => return Outcome::Failed(err),
                    }
                }
                Err(err) => return Outcome::Failed(err.into()),
            }
        }
    }

    fn record_event_id(&self, id: &str) {
        if !id.is_empty() {
            *self.last_event_id.write() = id.to_owned();
        }
    }

    /// Hand one message to the consumer and wait until it has been received.
    async fn deliver(
        &self,
        message: MessageEvent,
        released: &mut oneshot::Receiver<()>,
    ) -> EventSourceResult<Handoff> {
        let tx = self.events.lock().clone();
        let Some(tx) = tx else {
            return Ok(Handoff::Released { delivered: false });
        };

        let (ack, mut acked) = oneshot::channel();
        let sent = tokio::select! {
            biased;

            _ = &mut *released => None,
            sent = tx.send(Delivery { message, ack }) => Some(sent),
        };
        match sent {
            None => return Ok(Handoff::Released { delivered: false }),
            Some(Err(_)) => return Err(EventSourceError::ConsumerGone),
            Some(Ok(())) => {}
        }

        let received = tokio::select! {
            biased;

            _ = &mut *released => None,
            received = &mut acked => Some(received),
        };
        match received {
            Some(Ok(())) => Ok(Handoff::Delivered),
            Some(Err(_)) => Err(EventSourceError::ConsumerGone),
            None => {
                // Refuse a late ack so a queued message is never yielded.
                acked.close();
                Ok(Handoff::Released {
                    delivered: acked.try_recv().is_ok(),
                })
            }
        }
    }
}

/// Compares the media type only, ignoring parameters such as `charset`.
fn is_event_stream(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case(EVENT_STREAM_CONTENT_TYPE))
}

// ---------------------------------------------------------------------------
// Internal: background driver
// ---------------------------------------------------------------------------

/// The background task of one source.
///
/// Consumes the current connection, classifies the failure that ends it and
/// either reconnects or closes the source. Only one connection is ever alive.
async fn drive(shared: Arc<Shared>, mut connection: Connection) {
    loop {
        let err = match shared.consume(&mut connection).await {
            Outcome::Released => {
                debug!(url = %shared.url(), "EventSource transport released");
                return;
            }
            Outcome::Failed(err) => err,
        };

        let status = connection.status;
        drop(connection);

        if matches!(err, EventSourceError::ConsumerGone) {
            info!(url = %shared.url(), "EventSource consumer dropped, closing");
            shared.close();
            return;
        }
        if !should_reconnect(&err, Some(status)) {
            warn!(
                url = %shared.url(),
                error = %err,
                status = %status,
                "EventSource stream stopped, not reconnecting"
            );
            shared.close();
            return;
        }
        warn!(url = %shared.url(), error = %err, "EventSource stream interrupted");

        connection = match shared.reconnect().await {
            Ok(connection) => connection,
            Err(EventSourceError::Closed) => return,
            Err(err) => {
                error!(url = %shared.url(), error = %err, "EventSource reconnect failed terminally");
                shared.close();
                return;
            }
        };
    }
}
