// Public modules
pub mod chat_request;
pub mod chat_response;
pub mod error_envelope;
pub mod feedback;
pub mod finish_reason;
pub mod health;
pub mod message;
pub mod persona_id;
pub mod stream_chunk;
pub mod stream_event;
pub mod usage;

// Re-exports
pub use chat_request::{ChatRequest, DEFAULT_TEMPERATURE, MAX_TEMPERATURE, validate_temperature};
pub use chat_response::{ChatResponse, ChatResult};
pub use error_envelope::{ErrorDetail, ErrorEnvelope};
pub use feedback::{FeedbackRequest, FeedbackResponse, Rating};
pub use finish_reason::FinishReason;
pub use health::HealthResponse;
pub use message::{Message, Role};
pub use persona_id::PersonaId;
pub use stream_chunk::{StreamChunk, StreamDelta, StreamResult};
pub use stream_event::{DeltaEvent, StreamEvent};
pub use usage::Usage;
