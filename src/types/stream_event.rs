use crate::types::{FinishReason, Role, Usage};

/// One incremental fragment of an assistant message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaEvent {
    /// Present on the first fragment of a turn; carries no text.
    pub role: Option<Role>,

    /// The text fragment, possibly empty.
    pub content: String,

    /// Set once the model has finished the turn.
    pub finish_reason: Option<FinishReason>,
}

impl DeltaEvent {
    /// Create a delta carrying only a text fragment.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            role: None,
            content: content.into(),
            finish_reason: None,
        }
    }

    /// Set the role marker.
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the finish reason.
    pub fn with_finish_reason(mut self, finish_reason: FinishReason) -> Self {
        self.finish_reason = Some(finish_reason);
        self
    }
}

/// A decoded event from a streaming chat response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A content fragment.
    Delta(DeltaEvent),

    /// Token accounting; never alters the conversation.
    Usage(Usage),

    /// The end-of-stream sentinel. Nothing follows it.
    Terminal,
}

impl StreamEvent {
    /// The text fragment carried by this event, if any.
    pub fn fragment(&self) -> Option<&str> {
        match self {
            StreamEvent::Delta(delta) => Some(&delta.content),
            _ => None,
        }
    }

    /// Returns true if this is the end-of-stream sentinel.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Terminal)
    }
}

impl From<DeltaEvent> for StreamEvent {
    fn from(delta: DeltaEvent) -> Self {
        StreamEvent::Delta(delta)
    }
}
