//! Streaming utilities for SSE parsing and text aggregation.
//!
//! OpenAI-compatible servers answer `stream: true` requests with Server-Sent Events:
//!
//! ```text
//! data: {"id":"c1","object":"chat.completion.chunk","choices":[{"delta":{"content":"Hel"}}]}
//!
//! data: {"id":"c1","object":"chat.completion.chunk","choices":[{"delta":{"content":"lo"}}]}
//!
//! data: [DONE]
//! ```
//!
//! [`parse_sse_stream`] turns the HTTP body into a stream of [`OpenAIChunk`]s, buffering
//! across network chunk boundaries so an event or a character split between two reads
//! is still parsed.
//! [`TextAggregator`] concatenates the text deltas into the final completion.
//!
//! ```text
//! reqwest::Response
//!     │ parse_sse_stream()
//!     ▼
//! Stream<Result<OpenAIChunk>>
//!     │ TextAggregator::push()
//!     ▼
//! String
//! ```

use crate::types::OpenAIChunk;
use crate::{Error, Result};
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{Stream, StreamExt};
use std::fmt;
use std::pin::Pin;

/// Accumulates streamed text deltas.
///
/// Deltas are appended in arrival order regardless of `finish_reason`; servers differ on
/// whether the final chunk carries content.
#[derive(Debug, Default)]
pub struct TextAggregator {
    buffer: String,
    finished: bool,
}

impl TextAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one chunk's deltas
    pub fn push(&mut self, chunk: OpenAIChunk) {
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                self.buffer.push_str(&content);
            }
            if choice.finish_reason.is_some() {
                self.finished = true;
            }
        }
    }

    /// A `finish_reason` has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The text collected so far
    pub fn text(&self) -> &str {
        &self.buffer
    }

    pub fn into_text(self) -> String {
        self.buffer
    }
}

/// Drain the whole stream into a single string.
///
/// Chunk-level errors abort the read; partial text is discarded so a truncated
/// completion is never mistaken for a whole one.
pub async fn collect_text<S>(mut chunks: S) -> Result<String>
where
    S: Stream<Item = Result<OpenAIChunk>> + Unpin,
{
    let mut aggregator = TextAggregator::new();
    while let Some(chunk) = chunks.next().await {
        aggregator.push(chunk?);
    }
    Ok(aggregator.into_text())
}

/// Decode one SSE `data` payload.
///
/// Returns `None` for payloads that carry no chunk: empty data (comment-only or
/// `event:`-only events) and the `[DONE]` sentinel.
pub fn parse_sse_data(data: &str) -> Option<Result<OpenAIChunk>> {
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(
        serde_json::from_str::<OpenAIChunk>(data)
            .map_err(|e| Error::stream(format!("Failed to parse chunk: {}", e))),
    )
}

/// Decode a Server-Sent Events byte stream into chunks.
///
/// Framing and UTF-8 decoding are done by `eventsource-stream`, which buffers across
/// reads: an event, or a multi-byte character, split between two network reads is
/// reassembled before it is parsed.
///
/// # Error Handling
///
/// - **Transport errors** surface through `E: Into<Error>` ([`Error::Http`] for reqwest)
/// - **Malformed framing or JSON** surfaces as [`Error::Stream`]
///
/// Errors are per item; consumers decide whether to continue.
pub fn decode_sse_stream<S, B, E>(bytes: S) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>>
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + fmt::Display + Send + 'static,
{
    let chunks = bytes.eventsource().filter_map(|event| {
        let item = match event {
            Ok(event) => parse_sse_data(&event.data),
            Err(EventStreamError::Transport(e)) => Some(Err(e.into())),
            Err(other) => Some(Err(Error::stream(format!("Invalid event stream: {}", other)))),
        };
        futures::future::ready(item)
    });

    Box::pin(chunks)
}

/// Decode an HTTP response body as a Server-Sent Events stream
pub fn parse_sse_stream(
    body: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<OpenAIChunk>> + Send>> {
    decode_sse_stream(body.bytes_stream())
}
