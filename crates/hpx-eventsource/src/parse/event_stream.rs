//! [`Stream`] that decodes a stream of byte chunks into [`Event`]s.

use core::{
    pin::Pin,
    task::{Context, Poll, ready},
    time::Duration,
};

use bytes::{Buf, BufMut, BytesMut};
use bytes_utils::{Str, StrMut};
use futures_core::Stream;
use futures_util::StreamExt;

use super::{
    constants::{BOM, CR, EMPTY_STR, LF},
    errors::EventStreamError,
    event::{Event, MessageEvent},
    parser::{Field, FieldName, Line, next_line},
};

// ---------------------------------------------------------------------------
// BlockBuilder
// ---------------------------------------------------------------------------

/// Data lines of the current block.
///
/// Most blocks carry a single `data:` line, which is kept as-is; a mutable
/// buffer is only allocated once a second line arrives.
#[derive(Debug, Default)]
enum DataBuffer {
    #[default]
    Empty,
    Single(Str),
    Joined(StrMut),
}

impl DataBuffer {
    fn push(&mut self, line: Str) {
        match self {
            Self::Empty => *self = Self::Single(line),
            Self::Single(first) => {
                let inner = BytesMut::with_capacity(first.len() + 1 + line.len());
                // Safety: an empty buffer is valid UTF-8.
                let mut joined = unsafe { StrMut::from_inner_unchecked(inner) };
                joined.push_str(first);
                joined.push('\n');
                joined.push_str(&line);
                *self = Self::Joined(joined);
            }
            Self::Joined(joined) => {
                joined.push('\n');
                joined.push_str(&line);
            }
        }
    }

    fn freeze(self) -> Str {
        match self {
            Self::Empty => EMPTY_STR,
            Self::Single(s) => s,
            Self::Joined(s) => s.freeze(),
        }
    }
}

/// Fields of the block currently being read.
#[derive(Debug)]
struct BlockBuilder {
    id: Str,
    name: Str,
    data: DataBuffer,
    retry: Option<Duration>,
    /// A field line has been read since the last blank line.
    started: bool,
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self {
            id: EMPTY_STR,
            name: EMPTY_STR,
            data: DataBuffer::default(),
            retry: None,
            started: false,
        }
    }
}

impl BlockBuilder {
    fn add(&mut self, field: Field) {
        self.started = true;
        match field.name {
            FieldName::Event => self.name = field.value,
            FieldName::Data => self.data.push(field.value),
            FieldName::Id => {
                if memchr::memchr(0, field.value.as_bytes()).is_none() {
                    self.id = field.value;
                }
            }
            FieldName::Retry => {
                let digits = !field.value.is_empty()
                    && field.value.bytes().all(|b| b.is_ascii_digit());
                if digits && let Ok(millis) = field.value.parse() {
                    self.retry = Some(Duration::from_millis(millis));
                }
            }
            FieldName::Unknown => {}
        }
    }

    /// Closes the block on a blank line.
    ///
    /// Returns the retry directive and the message it carried, either of
    /// which may be absent.
    fn finish(&mut self) -> (Option<Duration>, Option<MessageEvent>) {
        let BlockBuilder {
            id,
            name,
            data,
            retry,
            ..
        } = core::mem::take(self);

        let data = data.freeze();
        let message = (!data.is_empty()).then(|| MessageEvent { id, name, data });
        (retry, message)
    }
}

// ---------------------------------------------------------------------------
// EventStream
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum StreamState {
    NotStarted,
    Started,
    Terminated,
}

pin_project_lite::pin_project! {
    /// Decodes a stream of byte chunks into [`Event`]s.
    ///
    /// Yields `Err(EventStreamError::Truncated)` once if the underlying stream
    /// ends mid-block, then `None`. A block carrying both `retry` and `data`
    /// yields the [`Event::Retry`] first and the message on the next poll.
    #[project = EventStreamProjection]
    #[derive(Debug)]
    pub struct EventStream<S> {
        #[pin]
        stream: S,
        buffer: BytesMut,
        block: BlockBuilder,
        queued: Option<MessageEvent>,
        state: StreamState,
    }
}

impl<S> EventStream<S> {
    /// Create a new decoder over an underlying byte stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buffer: BytesMut::new(),
            block: BlockBuilder::default(),
            queued: None,
            state: StreamState::NotStarted,
        }
    }
}

impl<S, E, B> EventStream<S>
where
    S: Stream<Item = Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
{
    /// Decode the next event.
    ///
    /// Fails with [`EventStreamError::Ended`] once the underlying stream is
    /// exhausted on a block boundary.
    pub async fn decode(&mut self) -> Result<Event, EventStreamError<E>> {
        self.next().await.unwrap_or(Err(EventStreamError::Ended))
    }
}

/// Returns `Some(true)` on a BOM, `Some(false)` on anything else, or `None`
/// while the buffer is still a strict prefix of the BOM.
fn starts_with_bom(buf: &[u8]) -> Option<bool> {
    let n = buf.len().min(BOM.len());
    if buf[..n] != BOM[..n] {
        Some(false)
    } else if n == BOM.len() {
        Some(true)
    } else {
        None
    }
}

/// Consumes complete lines until a block produces an event.
fn drain_buffer<E>(
    buffer: &mut BytesMut,
    block: &mut BlockBuilder,
    queued: &mut Option<MessageEvent>,
) -> Result<Option<Event>, EventStreamError<E>> {
    while let Some(line) = next_line(buffer) {
        match line {
            Line::Comment => {}
            Line::Field { name, value } => block.add(Field::decode(&name, value)?),
            Line::Blank => match block.finish() {
                (Some(delay), message) => {
                    *queued = message;
                    return Ok(Some(Event::Retry(delay)));
                }
                (None, Some(message)) => return Ok(Some(Event::Message(message))),
                (None, None) => {}
            },
        }
    }
    Ok(None)
}

impl<S, E, B> Stream for EventStream<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
{
    type Item = Result<Event, EventStreamError<E>>;

    fn poll_next(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<<Self as Stream>::Item>> {
        let mut this = self.project();

        if let Some(message) = this.queued.take() {
            return Poll::Ready(Some(Ok(Event::Message(message))));
        }

        loop {
            if let Some(item) = drain_buffer(this.buffer, this.block, this.queued).transpose() {
                return Poll::Ready(Some(item));
            }

            if let StreamState::Terminated = this.state {
                if this.block.started || !this.buffer.is_empty() {
                    this.buffer.clear();
                    *this.block = BlockBuilder::default();
                    return Poll::Ready(Some(Err(EventStreamError::Truncated)));
                }
                return Poll::Ready(None);
            }

            match ready!(this.stream.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => {
                    let chunk = chunk.as_ref();
                    if chunk.is_empty() {
                        continue;
                    }
                    this.buffer.extend_from_slice(chunk);

                    if let StreamState::NotStarted = this.state {
                        match starts_with_bom(this.buffer) {
                            Some(true) => {
                                this.buffer.advance(BOM.len());
                                *this.state = StreamState::Started;
                            }
                            Some(false) => *this.state = StreamState::Started,
                            None => continue,
                        }
                    }
                }
                Some(Err(e)) => return Poll::Ready(Some(Err(EventStreamError::Transport(e)))),
                None => {
                    *this.state = StreamState::Terminated;
                    // A trailing CR can no longer be the start of a CRLF.
                    if this.buffer.last() == Some(&CR) {
                        this.buffer.put_u8(LF);
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use futures_util::stream;

    use super::*;

    fn chunks(
        parts: &[&'static str],
    ) -> EventStream<impl Stream<Item = Result<Bytes, ()>> + Unpin> {
        let parts: Vec<Result<Bytes, ()>> = parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect();
        EventStream::new(stream::iter(parts))
    }

    async fn collect(parts: &[&'static str]) -> Vec<Result<Event, EventStreamError<()>>> {
        chunks(parts).collect().await
    }

    fn message(id: &str, name: &str, data: &str) -> Result<Event, EventStreamError<()>> {
        Ok(Event::Message(MessageEvent::new(
            Str::from(id),
            Str::from(name),
            Str::from(data),
        )))
    }

    #[tokio::test]
    async fn test_decodes_id_event_data_block() {
        assert_eq!(
            collect(&["id: X\nevent: Y\ndata: Z\n\n"]).await,
            vec![message("X", "Y", "Z")]
        );
    }

    #[tokio::test]
    async fn test_absent_fields_are_empty() {
        assert_eq!(
            collect(&["data: hello\n\n"]).await,
            vec![message("", "", "hello")]
        );
    }

    #[tokio::test]
    async fn test_id_does_not_carry_into_next_block() {
        assert_eq!(
            collect(&["id: 1\ndata: first\n\ndata: second\n\n"]).await,
            vec![message("1", "", "first"), message("", "", "second")]
        );
    }

    #[tokio::test]
    async fn test_data_lines_are_joined() {
        assert_eq!(
            collect(&["data: YHOO\ndata: +2\ndata: 10\n\n"]).await,
            vec![message("", "", "YHOO\n+2\n10")]
        );
        assert_eq!(
            collect(&["data\ndata\n\n"]).await,
            vec![message("", "", "\n")]
        );
    }

    #[tokio::test]
    async fn test_block_split_across_chunks() {
        assert_eq!(
            collect(&["data: Hello,", "", " world!\n", "\n"]).await,
            vec![message("", "", "Hello, world!")]
        );
    }

    #[tokio::test]
    async fn test_retry_only_block_is_a_directive() {
        assert_eq!(
            collect(&["retry: 3000\n\n"]).await,
            vec![Ok(Event::Retry(Duration::from_millis(3000)))]
        );
        assert_eq!(
            collect(&["retry: 0\n\n"]).await,
            vec![Ok(Event::Retry(Duration::ZERO))]
        );
    }

    #[tokio::test]
    async fn test_retry_with_data_yields_directive_then_message() {
        assert_eq!(
            collect(&["retry: 500\nid: 4\ndata: both\n\n"]).await,
            vec![
                Ok(Event::Retry(Duration::from_millis(500))),
                message("4", "", "both"),
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_retry_values_are_ignored() {
        assert_eq!(
            collect(&["retry: soon\n\nretry: +5\n\nretry: -1\ndata: x\n\n"]).await,
            vec![message("", "", "x")]
        );
    }

    #[tokio::test]
    async fn test_blocks_without_data_are_skipped() {
        assert_eq!(
            collect(&["id: 9\n\nevent: ping\n\ndata:\n\ndata: real\n\n"]).await,
            vec![message("", "", "real")]
        );
    }

    #[tokio::test]
    async fn test_comments_and_unknown_fields_are_ignored() {
        assert_eq!(
            collect(&[": test stream\n\nfoo: bar\ndata: first\nid: 1\n\n"]).await,
            vec![message("1", "", "first")]
        );
    }

    #[tokio::test]
    async fn test_id_with_nul_is_ignored() {
        assert_eq!(
            collect(&["id: a\0b\ndata: x\n\n"]).await,
            vec![message("", "", "x")]
        );
    }

    #[tokio::test]
    async fn test_bom_is_stripped() {
        assert_eq!(
            collect(&["\u{FEFF}data: test\n\n"]).await,
            vec![message("", "", "test")]
        );
        // BOM split across chunks.
        let mut stream = EventStream::new(stream::iter(vec![
            Ok::<_, ()>(Bytes::from_static(b"\xEF\xBB")),
            Ok::<_, ()>(Bytes::from_static(b"\xBFdata: test\n\n")),
        ]));
        assert_eq!(
            stream.decode().await,
            Ok(Event::Message(MessageEvent::new("", "", "test")))
        );
    }

    #[tokio::test]
    async fn test_crlf_and_cr_line_endings() {
        assert_eq!(
            collect(&["data: a\r\n\r\ndata: b\r\r"]).await,
            vec![message("", "", "a"), message("", "", "b")]
        );
    }

    #[tokio::test]
    async fn test_clean_end_yields_ended_from_decode() {
        let mut stream = chunks(&["data: only\n\n"]);
        assert_eq!(
            stream.decode().await,
            Ok(Event::Message(MessageEvent::new("", "", "only")))
        );
        assert_eq!(stream.decode().await, Err(EventStreamError::Ended));
    }

    #[tokio::test]
    async fn test_end_mid_block_is_truncated() {
        assert_eq!(
            collect(&["data: complete\n\ndata: partial\n"]).await,
            vec![message("", "", "complete"), Err(EventStreamError::Truncated)]
        );
        assert_eq!(
            collect(&["data: no newline"]).await,
            vec![Err(EventStreamError::Truncated)]
        );
        // A trailing CR still terminates the line, but not the block.
        assert_eq!(
            collect(&["data: test\r"]).await,
            vec![Err(EventStreamError::Truncated)]
        );
    }

    #[tokio::test]
    async fn test_trailing_comment_is_not_truncation() {
        let mut stream = chunks(&["data: x\n\n: keep-alive\n"]);
        assert!(stream.decode().await.is_ok());
        assert!(stream.decode().await.expect_err("end").is_ended());
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_an_error() {
        let mut stream = EventStream::new(stream::iter(vec![Ok::<_, ()>(Bytes::from_static(
            b"data: \xff\n\n",
        ))]));
        assert!(matches!(
            stream.decode().await,
            Err(EventStreamError::Utf8Error(_))
        ));
    }

    #[tokio::test]
    async fn test_transport_error_is_forwarded() {
        let mut stream = EventStream::new(stream::iter(vec![
            Ok(Bytes::from_static(b"data: a\n\n")),
            Err("reset"),
        ]));
        assert!(stream.decode().await.is_ok());
        assert_eq!(
            stream.decode().await,
            Err(EventStreamError::Transport("reset"))
        );
    }
}
