//! Server-Sent Events (SSE) processing for streaming responses.
//!
//! This module turns the raw byte stream of a streaming chat response into a
//! lazy stream of [`StreamEvent`]s. Only `data: ` lines carry events; every
//! other line is framing. A `data: [DONE]` line ends the stream. Payloads that
//! fail to decode are logged and skipped so that one bad chunk cannot sink an
//! otherwise healthy turn.

use std::collections::VecDeque;

use futures::stream::{self, Stream, StreamExt};

use crate::observability::{STREAM_BYTES, STREAM_ERRORS, STREAM_EVENTS, STREAM_MALFORMED};
use crate::types::{ErrorEnvelope, StreamChunk, StreamEvent};
use crate::{Error, Result};

/// Prefix that marks a line as carrying an event payload.
pub const DATA_PREFIX: &str = "data: ";

/// Payload that marks the end of the stream.
pub const TERMINAL_SENTINEL: &str = "[DONE]";

/// Status reported for errors the service sends in-band.
const IN_STREAM_ERROR_STATUS: u16 = 500;

/// Reassembles lines from arbitrarily split byte chunks.
///
/// Only the current unterminated line is carried between chunks. Lines are
/// split on `\n` with a trailing `\r` removed; splitting on bytes rather than
/// characters means a chunk boundary may fall inside a multi-byte character.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    /// Create an empty decoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every line it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            self.buffer.extend_from_slice(&rest[..pos]);
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(line);
            rest = &rest[pos + 1..];
        }
        self.buffer.extend_from_slice(rest);
        lines
    }

    /// Take the unterminated remainder, if any, once the source has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let mut line = std::mem::take(&mut self.buffer);
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        if line.is_empty() { None } else { Some(line) }
    }

    /// Bytes currently held for the unterminated line.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}

/// What a single line means to the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    /// The end-of-stream sentinel.
    Terminal,
    /// A payload to decode, already trimmed.
    Payload(&'a str),
}

/// Classify a line; framing lines (blank, `event:`, `id:`, comments) yield `None`.
pub fn classify_line(line: &str) -> Option<Frame<'_>> {
    let payload = line.strip_prefix(DATA_PREFIX)?.trim();
    if payload == TERMINAL_SENTINEL {
        Some(Frame::Terminal)
    } else {
        Some(Frame::Payload(payload))
    }
}

/// A decoded payload.
#[derive(Debug)]
enum Payload {
    /// Events carried by a well-formed chunk.
    Events(Vec<StreamEvent>),
    /// The service reported a failure in-band.
    ServiceError(Error),
}

/// Decode one payload. An `Err` means the payload is malformed.
fn decode_payload(payload: &str) -> Result<Payload> {
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(payload) {
        return Ok(Payload::ServiceError(
            envelope.into_error(IN_STREAM_ERROR_STATUS, None),
        ));
    }
    let chunk = StreamChunk::from_json(payload)?;
    chunk.into_events().map(Payload::Events)
}

/// Whether the decoder should keep reading after a line.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct SseState<S> {
    source: S,
    lines: LineDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    done: bool,
}

impl<S> SseState<S> {
    fn handle_line(&mut self, line: &[u8]) -> Flow {
        let line = match std::str::from_utf8(line) {
            Ok(line) => line,
            Err(e) => {
                STREAM_MALFORMED.click();
                tracing::warn!(error = %e, "dropping stream line with invalid UTF-8");
                return Flow::Continue;
            }
        };
        match classify_line(line) {
            None => Flow::Continue,
            Some(Frame::Terminal) => {
                self.pending.push_back(Ok(StreamEvent::Terminal));
                self.done = true;
                Flow::Stop
            }
            Some(Frame::Payload(payload)) => match decode_payload(payload) {
                Ok(Payload::Events(events)) => {
                    STREAM_EVENTS.count(events.len() as u64);
                    self.pending.extend(events.into_iter().map(Ok));
                    Flow::Continue
                }
                Ok(Payload::ServiceError(err)) => {
                    STREAM_ERRORS.click();
                    tracing::warn!(error = %err, "service reported an error mid-stream");
                    self.pending.push_back(Err(err));
                    self.done = true;
                    Flow::Stop
                }
                Err(err) => {
                    STREAM_MALFORMED.click();
                    tracing::warn!(error = %err, payload, "dropping malformed stream payload");
                    Flow::Continue
                }
            },
        }
    }
}

/// Process a stream of bytes into a stream of decoded stream events.
///
/// The returned stream is pull-driven: the source is only polled when the
/// caller asks for the next event and no decoded event is waiting. It ends
/// after a terminal sentinel (without polling the source again), after an
/// error, or when the source ends. A source that ends without a sentinel is a
/// normal completion.
pub fn process_sse<S, B>(byte_stream: S) -> impl Stream<Item = Result<StreamEvent>> + Send + 'static
where
    S: Stream<Item = Result<B>> + Unpin + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = SseState {
        source: byte_stream,
        lines: LineDecoder::new(),
        pending: VecDeque::new(),
        done: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }

            match state.source.next().await {
                Some(Ok(bytes)) => {
                    let bytes = bytes.as_ref();
                    STREAM_BYTES.count(bytes.len() as u64);
                    for line in state.lines.feed(bytes) {
                        if state.handle_line(&line) == Flow::Stop {
                            break;
                        }
                    }
                }
                Some(Err(e)) => {
                    STREAM_ERRORS.click();
                    state.done = true;
                    return Some((Err(e), state));
                }
                None => {
                    if let Some(line) = state.lines.finish() {
                        state.handle_line(&line);
                    }
                    state.done = true;
                }
            }
        }
    })
}
