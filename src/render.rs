//! Output rendering for chat turns.
//!
//! This module provides the renderer trait, a plain-text implementation, and
//! the glue that turns controller lifecycle events into renderer calls.

use std::io::{self, Stdout, Write};

use crate::chat::TurnEvent;
use crate::types::{FinishReason, Message, PersonaId, Role};

/// ANSI escape code for dim text (used for history and notices).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for speaker labels).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the persona's name).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for yellow text (used for truncation notices).
const ANSI_YELLOW: &str = "\x1b[33m";

/// ANSI escape code for red text (used for errors).
const ANSI_RED: &str = "\x1b[31m";

/// Trait for rendering chat output.
///
/// This abstraction allows for different rendering strategies:
/// - Plain text with ANSI styling
/// - Plain text without styling (for piping/redirecting)
pub trait Renderer: Send {
    /// Called when the persona begins answering.
    fn start_turn(&mut self, persona: &PersonaId);

    /// Print a chunk of response text.
    ///
    /// This is called incrementally as fragments are streamed from the service.
    fn print_text(&mut self, text: &str);

    /// Print an error message.
    fn print_error(&mut self, error: &str);

    /// Print an informational message.
    fn print_info(&mut self, info: &str);

    /// Print one stored message, as when replaying history.
    fn print_message(&mut self, persona: &PersonaId, message: &Message);

    /// Called when a response is complete.
    ///
    /// Used to ensure proper newlines and to flag answers cut short.
    fn finish_response(&mut self, finish_reason: Option<&FinishReason>);

    /// Called when the turn is cancelled by the user.
    fn print_interrupted(&mut self);
}

/// Plain text renderer with optional ANSI styling.
///
/// Response text goes to the wrapped writer (stdout by default); errors go to
/// stderr when writing to stdout.
pub struct PlainTextRenderer<W: Write + Send = Stdout> {
    out: W,
    use_color: bool,
    errors_to_stderr: bool,
    in_response: bool,
    streamed_text: bool,
}

impl PlainTextRenderer {
    /// Creates a new PlainTextRenderer with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new PlainTextRenderer with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            out: io::stdout(),
            use_color,
            errors_to_stderr: true,
            in_response: false,
            streamed_text: false,
        }
    }
}

impl<W: Write + Send> PlainTextRenderer<W> {
    /// Creates a renderer writing everything to `out`.
    pub fn with_writer(out: W, use_color: bool) -> Self {
        Self {
            out,
            use_color,
            errors_to_stderr: false,
            in_response: false,
            streamed_text: false,
        }
    }

    /// Consumes the renderer, returning its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn styled(&self, style: &str, text: &str) -> String {
        if self.use_color {
            format!("{style}{text}{ANSI_RESET}")
        } else {
            text.to_string()
        }
    }

    fn write(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
        let _ = self.out.flush();
    }

    fn end_response_line(&mut self) {
        if self.in_response {
            if self.streamed_text {
                self.write("\n");
            }
            self.in_response = false;
            self.streamed_text = false;
        }
    }
}

impl Default for PlainTextRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write + Send> Renderer for PlainTextRenderer<W> {
    fn start_turn(&mut self, persona: &PersonaId) {
        self.end_response_line();
        let label = self.styled(ANSI_CYAN, persona.as_str());
        let label = self.styled(ANSI_BOLD, &label);
        self.write(&format!("{label}: "));
        self.in_response = true;
    }

    fn print_text(&mut self, text: &str) {
        if !text.is_empty() {
            self.streamed_text = true;
        }
        self.write(text);
    }

    fn print_error(&mut self, error: &str) {
        let newline = if self.in_response { "\n" } else { "" };
        self.in_response = false;
        self.streamed_text = false;
        let line = self.styled(ANSI_RED, &format!("Error: {error}"));
        if self.errors_to_stderr {
            let _ = self.out.flush();
            eprintln!("{newline}{line}");
        } else {
            self.write(&format!("{newline}{line}\n"));
        }
    }

    fn print_info(&mut self, info: &str) {
        self.end_response_line();
        self.write(&format!("{info}\n"));
    }

    fn print_message(&mut self, persona: &PersonaId, message: &Message) {
        self.end_response_line();
        let speaker = match message.role {
            Role::Assistant => persona.as_str().to_string(),
            role => role.to_string(),
        };
        let speaker = self.styled(ANSI_BOLD, &speaker);
        let content = if message.role == Role::Assistant {
            message.content.clone()
        } else {
            self.styled(ANSI_DIM, &message.content)
        };
        self.write(&format!("{speaker}: {content}\n"));
    }

    fn finish_response(&mut self, finish_reason: Option<&FinishReason>) {
        let cut_short = matches!(
            finish_reason,
            Some(FinishReason::Length | FinishReason::ContentFilter)
        );
        self.write("\n");
        self.in_response = false;
        self.streamed_text = false;
        if let Some(reason) = finish_reason.filter(|_| cut_short) {
            let notice = self.styled(ANSI_YELLOW, &format!("[answer stopped: {reason}]"));
            self.write(&format!("{notice}\n"));
        }
    }

    fn print_interrupted(&mut self) {
        let newline = if self.streamed_text { "\n" } else { "" };
        self.in_response = false;
        self.streamed_text = false;
        let notice = self.styled(ANSI_DIM, "[interrupted]");
        self.write(&format!("{newline}{notice}\n"));
    }
}

/// Apply one lifecycle event to a renderer.
///
/// `streamed` tells whether fragments were shown for the turn; a committed
/// turn that streamed nothing prints its whole message instead.
pub fn render_event(renderer: &mut dyn Renderer, event: &TurnEvent, streamed: &mut bool) {
    match event {
        TurnEvent::Started { persona, .. } => {
            *streamed = false;
            renderer.start_turn(persona);
        }
        TurnEvent::Fragment { text, .. } => {
            *streamed = true;
            renderer.print_text(text);
        }
        TurnEvent::Committed {
            message,
            finish_reason,
            ..
        } => {
            if !*streamed {
                renderer.print_text(&message.content);
            }
            renderer.finish_response(finish_reason.as_ref());
        }
        TurnEvent::Failed { error, .. } => renderer.print_error(&error.to_string()),
        TurnEvent::Cancelled { .. } => renderer.print_interrupted(),
    }
}
