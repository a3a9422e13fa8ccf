//! Event-stream delta decoding.
//!
//! Upstream bodies arrive as `data: {json}` lines chunked at arbitrary byte
//! offsets. [`DeltaDecoder`] reassembles complete lines and yields only the
//! incremental text carried by `content_block_delta` / `text_delta` records.
//! Everything else (other record kinds, foreign lines, the `[DONE]` sentinel,
//! malformed JSON) is skipped without interrupting the stream.

use bytes::Bytes;
use futures::stream::{self, Stream, TryStreamExt};
use serde::Deserialize;

use crate::utf8::Utf8StreamDecoder;

/// Prefix that marks a line as an event payload.
pub const DATA_PREFIX: &str = "data: ";
/// Payload value that marks the end of the event stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// One parsed event-stream record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    MessageStart {},
    ContentBlockStart {},
    ContentBlockDelta { delta: StreamDelta },
    ContentBlockStop {},
    MessageDelta {},
    MessageStop {},
    Ping {},
    Error { error: serde_json::Value },
    #[serde(other)]
    Unknown,
}

/// Payload of a `content_block_delta` record.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

impl StreamEvent {
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Consumes the record, returning its text fragment when it carries one.
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::ContentBlockDelta {
                delta: StreamDelta::TextDelta { text },
            } => Some(text),
            Self::Error { error } => {
                tracing::warn!(error = %error, "upstream reported an in-band stream error");
                None
            }
            _ => None,
        }
    }
}

/// Extracts the text fragment carried by one complete line, if any.
///
/// Parse failures are swallowed: a malformed frame only costs its own line.
pub fn parse_data_line(line: &str) -> Option<String> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == DONE_SENTINEL {
        return None;
    }

    match StreamEvent::parse(payload) {
        Ok(event) => event.into_text(),
        Err(error) => {
            tracing::debug!(error = %error, "skipping malformed event-stream frame");
            None
        }
    }
}

/// Stateful decoder from raw body chunks to text fragments.
#[derive(Debug, Default)]
pub struct DeltaDecoder {
    utf8: Utf8StreamDecoder,
    buffer: String,
}

impl DeltaDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one raw chunk and returns every fragment it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        if chunk.is_empty() {
            return Vec::new();
        }

        let text = self.utf8.decode(chunk);
        self.buffer.push_str(&text);

        let Some(last_newline) = self.buffer.rfind('\n') else {
            return Vec::new();
        };

        // Keep the partial trailing line as the seed for the next chunk.
        let partial = self.buffer.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.buffer, partial);

        complete.split('\n').filter_map(parse_data_line).collect()
    }

    /// Bytes of an unterminated line still waiting for its newline.
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Ends decoding. An unterminated trailing line never completed, so it is dropped.
    pub fn finish(self) {
        if !self.buffer.is_empty() || self.utf8.has_pending() {
            tracing::debug!(
                leftover_bytes = self.buffer.len(),
                "discarding unterminated event-stream line at end of input"
            );
        }
    }
}

/// Lazily maps a chunked upstream body onto its text fragments.
///
/// Upstream read errors pass through untouched so the consumer can abort.
pub fn decode_deltas<S, E>(chunks: S) -> impl Stream<Item = Result<String, E>>
where
    S: Stream<Item = Result<Bytes, E>>,
{
    let mut decoder = DeltaDecoder::new();
    chunks
        .map_ok(move |chunk| stream::iter(decoder.feed(&chunk).into_iter().map(Ok)))
        .try_flatten()
}
