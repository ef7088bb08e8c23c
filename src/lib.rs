// Public modules
pub mod accumulating_stream;
pub mod chat;
pub mod client;
pub mod error;
pub mod observability;
pub mod render;
pub mod sse;
pub mod store;
pub mod types;
pub mod utils;

// Re-exports
pub use accumulating_stream::{AccumulatedTurn, AccumulatingStream, DeltaAccumulator};
pub use chat::{ChatController, CommittedTurn, SessionOptions, TurnEvent, TurnState};
pub use client::{ChatTransport, EventStream, SalonClient};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use render::{PlainTextRenderer, Renderer};
pub use sse::process_sse;
pub use store::{ConversationSet, ConversationStore, FileStore, MemoryStore};
pub use types::*;
