//! Incremental body decoders.
//!
//! Each decoder consumes a growing byte buffer and returns the records that
//! are complete so far, leaving the undecoded tail in the buffer. Feeding a
//! body in any chunking yields the same record sequence as feeding it whole.

mod eventsource;
mod ndjson;

pub use eventsource::SseMessage;
pub use eventsource::decode_eventsource;
pub use eventsource::fold_lines;
pub use eventsource::push_records;
pub use ndjson::decode_ndjson;

use crate::record::Record;
use bytes::Bytes;
use thiserror::Error;

/// Body format of a response. Fixed for the lifetime of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecoderKind {
    /// Every chunk is passed through as one [`Record::Bytes`].
    Raw,
    /// Newline-delimited JSON documents.
    Ndjson,
    /// Server-sent events carrying `{"type": "push", "data": [...]}` envelopes.
    EventSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid json document {line:?}: {message}")]
    InvalidJson { line: String, message: String },
    #[error("event stream is not valid utf-8")]
    InvalidUtf8,
}

/// Undecoded state carried from one decode step to the next.
#[derive(Debug, Default)]
pub struct DecodeBuffer {
    pending: Vec<u8>,
    message: SseMessage,
    last_event_id: Option<String>,
}

impl DecodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    /// Id of the most recently dispatched event-stream message.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}

/// Appends `bytes` to `buffer` and decodes every complete record.
pub fn decode(
    kind: DecoderKind,
    buffer: &mut DecodeBuffer,
    bytes: &[u8],
) -> Result<Vec<Record>, DecodeError> {
    match kind {
        DecoderKind::Raw => {
            if bytes.is_empty() {
                return Ok(Vec::new());
            }
            Ok(vec![Record::Bytes(Bytes::copy_from_slice(bytes))])
        }
        DecoderKind::Ndjson => {
            buffer.pending.extend_from_slice(bytes);
            // The remainder never holds a newline, so there is nothing new to
            // split unless this chunk brought one.
            if !bytes.contains(&b'\n') {
                return Ok(Vec::new());
            }
            let (records, remainder) = decode_ndjson(&buffer.pending)?;
            let consumed = buffer.pending.len() - remainder.len();
            buffer.pending.drain(..consumed);
            Ok(records)
        }
        DecoderKind::EventSource => {
            buffer.pending.extend_from_slice(bytes);
            let DecodeBuffer {
                pending,
                message,
                last_event_id,
            } = buffer;
            let records = decode_eventsource(pending, message, last_event_id)?;
            Ok(records)
        }
    }
}

/// Flushes whatever the body left behind once the transport reports `done`.
///
/// A final NDJSON document without a trailing newline is still a document;
/// an unterminated event-stream block is discarded.
pub fn finish(kind: DecoderKind, buffer: &mut DecodeBuffer) -> Result<Vec<Record>, DecodeError> {
    let pending = std::mem::take(&mut buffer.pending);
    match kind {
        DecoderKind::Raw => Ok(Vec::new()),
        DecoderKind::Ndjson => Ok(ndjson::parse_line(&pending)?.into_iter().collect()),
        DecoderKind::EventSource => {
            buffer.message = SseMessage::default();
            Ok(Vec::new())
        }
    }
}
