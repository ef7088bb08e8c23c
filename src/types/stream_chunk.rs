use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{DeltaEvent, FinishReason, Role, StreamEvent, Usage};
use crate::{Error, Result};

/// The incremental part of a stream chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StreamDelta {
    /// Role marker, sent once at the start of a turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Text fragment.
    #[serde(default)]
    pub content: String,
}

/// The `result` member of a stream chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamResult {
    /// The fragment.
    pub delta: StreamDelta,

    /// Why generation stopped, once it has.
    #[serde(default)]
    pub finish_reason: Option<FinishReason>,
}

/// One `data:` payload of a streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamChunk {
    /// Content carried by this chunk.
    #[serde(default)]
    pub result: Option<StreamResult>,

    /// Token accounting carried by this chunk.
    #[serde(default)]
    pub usage: Option<Usage>,

    /// When the service started the response.
    #[serde(with = "crate::utils::time")]
    pub created: OffsetDateTime,

    /// Service-assigned response id, shared by every chunk of one response.
    pub id: String,
}

impl StreamChunk {
    /// Parse a `data:` payload, reporting missing fields as a malformed envelope.
    pub fn from_json(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| {
            Error::malformed_envelope(format!("invalid stream chunk: {e}"), Some(Box::new(e)))
        })
    }

    /// Split the chunk into the events it carries: the delta first, then usage.
    ///
    /// A chunk that carries neither is malformed.
    pub fn into_events(self) -> Result<Vec<StreamEvent>> {
        let mut events = Vec::with_capacity(2);
        if let Some(result) = self.result {
            events.push(StreamEvent::Delta(DeltaEvent {
                role: result.delta.role,
                content: result.delta.content,
                finish_reason: result.finish_reason,
            }));
        }
        if let Some(usage) = self.usage {
            events.push(StreamEvent::Usage(usage));
        }
        if events.is_empty() {
            return Err(Error::malformed_envelope(
                format!("stream chunk {:?} has neither result nor usage", self.id),
                None,
            ));
        }
        Ok(events)
    }
}
