//! Accumulates streaming events into a complete message while passing events through.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;

use crate::types::{FinishReason, Message, StreamEvent, Usage};
use crate::Error;

/// The result of folding one turn's stream events.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedTurn {
    /// The assistant message built from every fragment, in arrival order.
    pub message: Message,
    /// The first finish reason reported, if any.
    pub finish_reason: Option<FinishReason>,
    /// The most recent usage annotation, if any.
    pub usage: Option<Usage>,
    /// Whether the stream ended with an explicit terminal sentinel.
    pub saw_terminal: bool,
    /// Number of delta events folded, including empty ones.
    pub fragments: usize,
}

/// Folds delta events into one growing assistant message.
///
/// Fragments are appended exactly as they arrive; role markers carry no text.
/// The first finish reason wins, but fragments arriving after it are still
/// appended. Usage never touches the text.
#[derive(Debug, Default, Clone)]
pub struct DeltaAccumulator {
    text: String,
    finish_reason: Option<FinishReason>,
    usage: Option<Usage>,
    saw_terminal: bool,
    fragments: usize,
}

impl DeltaAccumulator {
    /// Create an empty accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the turn.
    pub fn apply(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Delta(delta) => {
                self.fragments += 1;
                self.text.push_str(&delta.content);
                if self.finish_reason.is_none() {
                    self.finish_reason = delta.finish_reason.clone();
                }
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(usage.clone());
            }
            StreamEvent::Terminal => {
                self.saw_terminal = true;
            }
        }
    }

    /// The text accumulated so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// The finish reason, once one has been reported.
    pub fn finish_reason(&self) -> Option<&FinishReason> {
        self.finish_reason.as_ref()
    }

    /// The usage annotation, if one has been reported.
    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }

    /// Returns true once the model reported the end of content or the stream ended.
    pub fn is_finished(&self) -> bool {
        self.finish_reason.is_some() || self.saw_terminal
    }

    /// Finish the turn. An accumulator that saw no fragments yields an empty message.
    pub fn finalize(self) -> AccumulatedTurn {
        AccumulatedTurn {
            message: Message::assistant(self.text),
            finish_reason: self.finish_reason,
            usage: self.usage,
            saw_terminal: self.saw_terminal,
            fragments: self.fragments,
        }
    }
}

/// A stream wrapper that accumulates `StreamEvent`s into a complete assistant message.
///
/// This allows streaming fragments to observers while simultaneously building the
/// final message without buffering. When the stream is fully drained, the
/// accumulated turn is sent via the oneshot channel returned by `new()`.
pub struct AccumulatingStream {
    inner: Pin<Box<dyn Stream<Item = Result<StreamEvent, Error>> + Send>>,
    turn_tx: Option<tokio::sync::oneshot::Sender<AccumulatedTurn>>,
    accumulator: DeltaAccumulator,
}

impl AccumulatingStream {
    /// Wraps a `StreamEvent` stream to accumulate its deltas.
    ///
    /// Returns the stream and a receiver that will contain the accumulated turn once
    /// the stream is fully drained.
    pub fn new<S>(stream: S) -> (Self, tokio::sync::oneshot::Receiver<AccumulatedTurn>)
    where
        S: Stream<Item = Result<StreamEvent, Error>> + Send + 'static,
    {
        let (tx, rx) = tokio::sync::oneshot::channel();
        let this = Self {
            inner: Box::pin(stream),
            turn_tx: Some(tx),
            accumulator: DeltaAccumulator::new(),
        };
        (this, rx)
    }

    /// The accumulator as it stands.
    pub fn accumulator(&self) -> &DeltaAccumulator {
        &self.accumulator
    }

    /// Finalizes the currently accumulated turn without draining the stream.
    pub fn finalize_partial(&mut self) -> AccumulatedTurn {
        self.turn_tx.take();
        std::mem::take(&mut self.accumulator).finalize()
    }
}

impl Stream for AccumulatingStream {
    type Item = Result<StreamEvent, Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(event))) => {
                self.accumulator.apply(&event);
                Poll::Ready(Some(Ok(event)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                if let Some(tx) = self.turn_tx.take() {
                    let turn = std::mem::take(&mut self.accumulator).finalize();
                    let _ = tx.send(turn);
                }
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
