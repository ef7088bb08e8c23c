use serde::{Deserialize, Serialize};

use crate::types::{Message, PersonaId};
use crate::{Error, Result};

/// Default sampling temperature used by the service.
pub const DEFAULT_TEMPERATURE: f32 = 0.5;

/// Highest sampling temperature the service accepts.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Check that a sampling temperature is finite and within `0.0..=2.0`.
pub fn validate_temperature(temperature: f32) -> Result<f32> {
    if temperature.is_finite() && (0.0..=MAX_TEMPERATURE).contains(&temperature) {
        Ok(temperature)
    } else {
        Err(Error::validation(
            format!("temperature must be between 0.0 and {MAX_TEMPERATURE}, got {temperature}"),
            Some("temperature".to_string()),
        ))
    }
}

/// Body of a chat request.
///
/// `messages` is the persona's full transcript, oldest first, ending with the
/// user message that prompts the turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The character the service should play.
    pub character: PersonaId,

    /// The conversation so far.
    pub messages: Vec<Message>,

    /// Whether to receive the answer as an event stream.
    #[serde(default)]
    pub stream: bool,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl ChatRequest {
    /// Create a new validated `ChatRequest`.
    pub fn new(
        character: PersonaId,
        messages: Vec<Message>,
        stream: bool,
        temperature: f32,
    ) -> Result<Self> {
        if messages.is_empty() {
            return Err(Error::validation(
                "a chat request needs at least one message",
                Some("messages".to_string()),
            ));
        }
        let temperature = validate_temperature(temperature)?;
        Ok(Self {
            character,
            messages,
            stream,
            temperature,
        })
    }

    /// The same request with streaming switched on or off.
    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}
