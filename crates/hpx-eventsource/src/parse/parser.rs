//! Line splitting and field parsing.
//!
//! Works on raw bytes; UTF-8 is only checked once a field value is kept.

use core::str::Utf8Error;

use bytes::{Buf, Bytes, BytesMut};
use bytes_utils::Str;

use super::constants::{CR, LF};

/// One line taken off the front of the buffer.
#[derive(Debug, Clone)]
pub(crate) enum Line {
    /// Empty line, terminating the current block.
    Blank,
    /// Line starting with `:`.
    Comment,
    /// `name: value` line. `value` is empty when the line has no colon.
    Field { name: Bytes, value: Bytes },
}

/// Field names with a meaning in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FieldName {
    Event,
    Data,
    Id,
    Retry,
    Unknown,
}

impl FieldName {
    fn from_bytes(name: &[u8]) -> Self {
        match name {
            b"event" => Self::Event,
            b"data" => Self::Data,
            b"id" => Self::Id,
            b"retry" => Self::Retry,
            _ => Self::Unknown,
        }
    }
}

/// A field line whose value has been validated as UTF-8.
#[derive(Debug, Clone)]
pub(crate) struct Field {
    pub(crate) name: FieldName,
    pub(crate) value: Str,
}

impl Field {
    pub(crate) fn decode(name: &[u8], value: Bytes) -> Result<Self, Utf8Error> {
        core::str::from_utf8(&value)?;
        // Safety: the bytes were validated as UTF-8 just above.
        let value = unsafe { Str::from_inner_unchecked(value) };
        Ok(Self {
            name: FieldName::from_bytes(name),
            value,
        })
    }
}

/// Locates the first line terminator.
///
/// Returns `(line_end, next_line_start)`, or `None` when more bytes are
/// needed. A CR as the very last byte is held back since it may be the first
/// half of a CRLF pair.
fn find_line_end(bytes: &[u8]) -> Option<(usize, usize)> {
    let at = memchr::memchr2(CR, LF, bytes)?;
    if bytes[at] == LF {
        return Some((at, at + 1));
    }
    match bytes.get(at + 1) {
        None => None,
        Some(&LF) => Some((at, at + 2)),
        Some(_) => Some((at, at + 1)),
    }
}

fn split_line(line: Bytes) -> Line {
    if line.is_empty() {
        return Line::Blank;
    }
    match memchr::memchr(b':', &line) {
        Some(0) => Line::Comment,
        Some(colon) => {
            let mut value = line.slice(colon + 1..);
            if value.first() == Some(&b' ') {
                value.advance(1);
            }
            Line::Field {
                name: line.slice(..colon),
                value,
            }
        }
        None => Line::Field {
            name: line,
            value: Bytes::new(),
        },
    }
}

/// Takes the next complete line off `buffer`, consuming its terminator.
pub(crate) fn next_line(buffer: &mut BytesMut) -> Option<Line> {
    let (line_end, next_start) = find_line_end(buffer)?;
    let line = buffer.split_to(line_end).freeze();
    buffer.advance(next_start - line_end);
    Some(split_line(line))
}
