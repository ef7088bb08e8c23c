//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for controlling chat behavior.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::chat::session::SessionOptions;
use crate::client::{BASE_URL_ENV, DEFAULT_BASE_URL};
use crate::types::{DEFAULT_TEMPERATURE, PersonaId, validate_temperature};
use crate::{Error, Result};

/// Persona selected when none is given.
pub const DEFAULT_PERSONA: &str = "tocqueville";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Command-line arguments for the salon-chat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Base URL of the chat service.
    #[arrrg(
        optional,
        "Service base URL (default: $SALON_BASE_URL or http://localhost:8000/api/v1/)",
        "URL"
    )]
    pub base_url: Option<String>,

    /// Persona to talk to first.
    #[arrrg(optional, "Persona to chat with (default: tocqueville)", "PERSONA")]
    pub persona: Option<String>,

    /// Sampling temperature.
    #[arrrg(optional, "Sampling temperature 0.0-2.0 (default: 0.5)", "TEMP")]
    pub temperature: Option<String>,

    /// Ask for single responses instead of event streams.
    #[arrrg(flag, "Disable streaming responses")]
    pub no_stream: bool,

    /// Where conversations are kept.
    #[arrrg(optional, "Conversation store file", "PATH")]
    pub store: Option<String>,

    /// Request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 60)", "SECS")]
    pub timeout: Option<u64>,

    /// Identifier attached to feedback.
    #[arrrg(optional, "User id sent with feedback (default: $USER)", "ID")]
    pub user_id: Option<String>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values after processing
/// command-line arguments with appropriate defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    /// Base URL of the chat service.
    pub base_url: String,

    /// The persona conversations start with.
    pub persona: PersonaId,

    /// Whether to request event streams.
    pub stream: bool,

    /// Sampling temperature.
    pub temperature: f32,

    /// File backing the conversation store.
    pub store_path: PathBuf,

    /// Request timeout.
    pub timeout: Duration,

    /// Identifier attached to feedback submissions.
    pub user_id: String,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: `$SALON_BASE_URL`, else `http://localhost:8000/api/v1/`
    /// - Persona: tocqueville
    /// - Streaming: enabled
    /// - Temperature: 0.5
    /// - Store: `<data dir>/salon/conversations.json`
    pub fn new() -> Self {
        Self {
            base_url: env::var(BASE_URL_ENV).unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            persona: default_persona(),
            stream: true,
            temperature: DEFAULT_TEMPERATURE,
            store_path: default_store_path(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_id: env::var("USER").unwrap_or_else(|_| "anonymous".to_string()),
            use_color: true,
        }
    }

    /// Resolve command-line arguments over the defaults.
    pub fn from_args(args: ChatArgs) -> Result<Self> {
        let defaults = Self::new();
        let persona = match args.persona {
            Some(persona) => PersonaId::new(persona)?,
            None => defaults.persona,
        };
        let temperature = match args.temperature {
            Some(temperature) => validate_temperature(parse_temperature(&temperature)?)?,
            None => defaults.temperature,
        };
        let timeout = match args.timeout {
            Some(0) => {
                return Err(Error::validation(
                    "timeout must be at least one second",
                    Some("timeout".to_string()),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.timeout,
        };
        Ok(Self {
            base_url: args.base_url.unwrap_or(defaults.base_url),
            persona,
            stream: !args.no_stream,
            temperature,
            store_path: args.store.map(PathBuf::from).unwrap_or(defaults.store_path),
            timeout,
            user_id: args.user_id.unwrap_or(defaults.user_id),
            use_color: !args.no_color,
        })
    }

    /// Sets the persona.
    pub fn with_persona(mut self, persona: PersonaId) -> Self {
        self.persona = persona;
        self
    }

    /// Sets the store path.
    pub fn with_store_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.store_path = path.into();
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// The options the controller starts with.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            stream: self.stream,
            temperature: self.temperature,
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_temperature(value: &str) -> Result<f32> {
    value.trim().parse().map_err(|_| {
        Error::validation(
            format!("temperature must be a number, got {value:?}"),
            Some("temperature".to_string()),
        )
    })
}

fn default_persona() -> PersonaId {
    PersonaId::from_static(DEFAULT_PERSONA)
}

fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("salon")
        .join("conversations.json")
}
