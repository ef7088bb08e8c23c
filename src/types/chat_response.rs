use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::{FinishReason, Message, Usage};
use crate::{Error, Result};

/// The answer inside a non-streaming response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResult {
    /// The assistant's message.
    pub message: Message,

    /// Why generation stopped.
    #[serde(default)]
    pub finish_reason: FinishReason,
}

/// A complete, non-streaming chat response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatResponse {
    /// The answer.
    pub result: ChatResult,

    /// Token accounting for the turn.
    pub usage: Usage,

    /// When the service produced the response.
    #[serde(with = "crate::utils::time")]
    pub created: OffsetDateTime,

    /// Service-assigned response id.
    pub id: String,
}

impl ChatResponse {
    /// Parse a response body, reporting missing fields as a malformed envelope.
    pub fn from_json(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| {
            Error::malformed_envelope(
                format!("invalid chat response: {e}"),
                Some(Box::new(e)),
            )
        })
    }

    /// The assistant's message.
    pub fn message(&self) -> &Message {
        &self.result.message
    }
}
