//! Slash command parsing for the chat application.
//!
//! This module handles parsing of special commands that start with `/`,
//! allowing users to control the chat session without sending messages
//! to the service.

use crate::types::{MAX_TEMPERATURE, PersonaId};

/// A parsed chat command.
///
/// These commands control the chat session and are not sent to the service.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Switch to another persona.
    Persona(PersonaId),

    /// List personas with a stored conversation.
    ListPersonas,

    /// Print the current persona's conversation.
    History,

    /// Clear the current persona's conversation.
    Clear,

    /// Clear every persona's conversation.
    ClearAll,

    /// Turn streaming on or off.
    Stream(bool),

    /// Set the sampling temperature.
    Temperature(f32),

    /// Rate the current conversation from 1 to 10, with an optional comment.
    Feedback {
        /// Overall rating.
        rating: u8,
        /// Free-form comment.
        comment: Option<String>,
    },

    /// Probe the service's health endpoint.
    Health,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Show the current configuration.
    ShowConfig,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a valid command,
/// or `None` if it should be treated as a regular message.
///
/// # Examples
///
/// ```
/// # use salon::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/persona tocqueville").is_some());
/// assert!(parse_command("Qu'est-ce que la démocratie ?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "persona" | "p" => match argument.map(PersonaId::new) {
            Some(Ok(persona)) => ChatCommand::Persona(persona),
            Some(Err(err)) => ChatCommand::Invalid(format!("/persona {err}")),
            None => ChatCommand::Invalid("/persona requires a persona name".to_string()),
        },
        "personas" => ChatCommand::ListPersonas,
        "history" => ChatCommand::History,
        "clear" => ChatCommand::Clear,
        "clear-all" | "clear_all" => ChatCommand::ClearAll,
        "stream" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Stream(value),
            None => ChatCommand::Invalid("/stream expects 'on' or 'off'".to_string()),
        },
        "temperature" => match argument {
            Some(arg) => match parse_f32_in_range(arg, 0.0, MAX_TEMPERATURE) {
                Ok(value) => ChatCommand::Temperature(value),
                Err(err) => ChatCommand::Invalid(format!("/temperature {err}")),
            },
            None => ChatCommand::Invalid("/temperature requires a value".to_string()),
        },
        "feedback" => parse_feedback_command(argument),
        "health" => ChatCommand::Health,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        "config" => ChatCommand::ShowConfig,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_feedback_command(argument: Option<&str>) -> ChatCommand {
    let Some(arg) = argument else {
        return ChatCommand::Invalid("/feedback requires a rating from 1 to 10".to_string());
    };

    let mut parts = arg.splitn(2, ' ');
    let rating = parts.next().unwrap_or_default();
    let comment = parts
        .next()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(String::from);
    match rating.parse::<u8>() {
        Ok(rating @ 1..=10) => ChatCommand::Feedback { rating, comment },
        _ => ChatCommand::Invalid("/feedback expects a rating from 1 to 10".to_string()),
    }
}

fn parse_f32_in_range(value: &str, min: f32, max: f32) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| format!("expects a value between {min} and {max}"))?;
    if parsed.is_finite() && parsed >= min && parsed <= max {
        Ok(parsed)
    } else {
        Err(format!("expects a value between {min} and {max}"))
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /persona <name>        Switch persona (e.g., /persona tocqueville)
  /personas              List personas with a conversation
  /history               Show the current conversation
  /clear                 Clear the current persona's conversation
  /clear-all             Clear every conversation
  /stream on|off         Toggle streaming responses
  /temperature <v>       Set temperature 0.0-2.0
  /feedback <1-10> [text] Rate the current conversation
  /health                Check the service
  /config                Show current configuration
  /help                  Show this help message
  /quit                  Exit the chat

Press Ctrl-C while an answer is arriving to cancel it."#
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_quit_commands() {
        assert_eq!(parse_command("/quit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/exit"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("/q"), Some(ChatCommand::Quit));
        assert_eq!(parse_command("  /quit  "), Some(ChatCommand::Quit));
    }

    #[test]
    fn parse_clear() {
        assert_eq!(parse_command("/clear"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/CLEAR"), Some(ChatCommand::Clear));
        assert_eq!(parse_command("/clear-all"), Some(ChatCommand::ClearAll));
    }

    #[test]
    fn parse_persona() {
        assert_eq!(
            parse_command("/persona  Tocqueville "),
            Some(ChatCommand::Persona(PersonaId::new("tocqueville").unwrap()))
        );
        assert_eq!(
            parse_command("/persona"),
            Some(ChatCommand::Invalid(
                "/persona requires a persona name".to_string()
            ))
        );
        assert_eq!(parse_command("/personas"), Some(ChatCommand::ListPersonas));
    }

    #[test]
    fn parse_temperature() {
        assert_eq!(
            parse_command("/temperature 1.5"),
            Some(ChatCommand::Temperature(1.5))
        );
        assert!(matches!(
            parse_command("/temperature 2.5"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("between")
        ));
        assert!(matches!(
            parse_command("/temperature"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("requires")
        ));
    }

    #[test]
    fn parse_stream_toggle() {
        assert_eq!(parse_command("/stream on"), Some(ChatCommand::Stream(true)));
        assert_eq!(parse_command("/stream off"), Some(ChatCommand::Stream(false)));
        assert!(matches!(
            parse_command("/stream maybe"),
            Some(ChatCommand::Invalid(msg)) if msg.contains("expects")
        ));
    }

    #[test]
    fn parse_feedback() {
        assert_eq!(
            parse_command("/feedback 8 very insightful"),
            Some(ChatCommand::Feedback {
                rating: 8,
                comment: Some("very insightful".to_string())
            })
        );
        assert_eq!(
            parse_command("/feedback 10"),
            Some(ChatCommand::Feedback {
                rating: 10,
                comment: None
            })
        );
        assert!(matches!(
            parse_command("/feedback 0"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/feedback great"),
            Some(ChatCommand::Invalid(_))
        ));
        assert!(matches!(
            parse_command("/feedback"),
            Some(ChatCommand::Invalid(_))
        ));
    }

    #[test]
    fn parse_misc() {
        assert_eq!(parse_command("/history"), Some(ChatCommand::History));
        assert_eq!(parse_command("/health"), Some(ChatCommand::Health));
        assert_eq!(parse_command("/config"), Some(ChatCommand::ShowConfig));
        assert_eq!(
            parse_command("/bogus"),
            Some(ChatCommand::Invalid("Unknown command: /bogus".to_string()))
        );
    }

    #[test]
    fn non_commands() {
        assert_eq!(parse_command("Bonjour, monsieur !"), None);
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("  "), None);
    }

    #[test]
    fn help_text_not_empty() {
        let help = help_text();
        assert!(help.contains("/quit"));
        assert!(help.contains("/persona"));
        assert!(help.contains("/feedback"));
        assert!(help.contains("/temperature"));
    }
}
