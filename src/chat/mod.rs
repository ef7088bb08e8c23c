//! Chat application module for conversations with historical characters.
//!
//! This module provides the turn controller and the pieces of the streaming
//! REPL built on top of it. It supports:
//!
//! - One turn in flight per persona, with cancellation
//! - Streamed or single-response answers
//! - Slash commands for session control
//!
//! # Architecture
//!
//! The module is organized into several components:
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`session`]: The turn controller and its lifecycle events
//! - [`commands`]: Slash command parsing and handling

mod commands;
mod config;
mod session;

pub use crate::render::{PlainTextRenderer, Renderer, render_event};
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{ChatArgs, ChatConfig, DEFAULT_PERSONA};
pub use session::{
    ChatController, CommittedTurn, EVENT_CAPACITY, SessionOptions, TurnEvent, TurnState,
};
