//! Interactive chat application for conversing with historical characters.
//!
//! This binary provides a streaming REPL interface to the salon chat service.
//! Each persona keeps its own conversation, stored on disk between runs.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage with default settings
//! salon-chat
//!
//! # Talk to another persona on another server
//! salon-chat --persona weber --base-url http://salon.example.com/api/v1/
//!
//! # Ask for whole answers instead of streams
//! salon-chat --no-stream
//!
//! # Disable colors (useful for piping output)
//! salon-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/persona <name>` - Switch persona
//! - `/history` - Show the current conversation
//! - `/clear` - Clear the current conversation
//! - `/quit` - Exit the application
//!
//! Ctrl-C while an answer is arriving cancels it.

use std::sync::Arc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use salon::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatController, PlainTextRenderer, Renderer, TurnEvent,
    help_text, parse_command, render_event,
};
use salon::{FileStore, PersonaId, SalonClient};

type Controller = ChatController<SalonClient>;

/// Main entry point for the salon-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("salon-chat [OPTIONS]");

    // Logs go to stderr so they never interleave with streamed answers.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ChatConfig::from_args(args)?;
    let client = Arc::new(SalonClient::with_options(
        Some(config.base_url.clone()),
        Some(config.timeout),
    )?);
    let store = Arc::new(FileStore::open(&config.store_path)?);
    let controller = Arc::new(ChatController::new(
        Arc::clone(&client),
        store,
        config.session_options(),
    ));

    let mut renderer = PlainTextRenderer::with_color(config.use_color);
    let mut rl = DefaultEditor::new()?;
    let mut events = controller.subscribe();
    let mut persona = config.persona.clone();

    // Ctrl-C during a turn cancels it; at the prompt rustyline sees it first.
    let cancel_handle = Arc::clone(&controller);
    ctrlc::set_handler(move || {
        cancel_handle.cancel_all();
    })?;

    println!("Salon (persona: {persona}, server: {})", client.base_url());
    println!("Type /help for commands, /quit to exit\n");

    loop {
        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(line);

                // Check for slash commands
                if let Some(cmd) = parse_command(line) {
                    match cmd {
                        ChatCommand::Quit => {
                            println!("Goodbye!");
                            break;
                        }
                        ChatCommand::Persona(next) => {
                            persona = next;
                            let count = controller
                                .history(&persona)
                                .map(|history| history.len())
                                .unwrap_or(0);
                            renderer.print_info(&format!(
                                "Now talking to {persona} ({count} messages so far)."
                            ));
                        }
                        ChatCommand::ListPersonas => match controller.personas() {
                            Ok(personas) => print_personas(&personas, &persona),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::History => match controller.history(&persona) {
                            Ok(history) if history.is_empty() => {
                                renderer.print_info("No messages yet.")
                            }
                            Ok(history) => {
                                for message in &history {
                                    renderer.print_message(&persona, message);
                                }
                            }
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Clear => match controller.clear(&persona) {
                            Ok(()) => renderer.print_info("Conversation cleared."),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::ClearAll => match controller.clear_all() {
                            Ok(()) => renderer.print_info("All conversations cleared."),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::Stream(stream) => {
                            controller.set_stream(stream);
                            let state = if stream { "on" } else { "off" };
                            renderer.print_info(&format!("Streaming {state}."));
                        }
                        ChatCommand::Temperature(value) => {
                            match controller.set_temperature(value) {
                                Ok(()) => renderer
                                    .print_info(&format!("temperature set to {:.2}", value)),
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Feedback { rating, comment } => {
                            let request = controller.feedback_request(
                                &persona,
                                config.user_id.clone(),
                                rating,
                                comment,
                            );
                            let outcome = match request {
                                Ok(request) => client.submit_feedback(&request).await,
                                Err(err) => Err(err),
                            };
                            match outcome {
                                Ok(response) if response.is_ok() => {
                                    renderer.print_info("Thank you for your feedback.")
                                }
                                Ok(response) => renderer.print_error(&format!(
                                    "Feedback not recorded: {}",
                                    response.result
                                )),
                                Err(err) => renderer.print_error(&err.to_string()),
                            }
                        }
                        ChatCommand::Health => match client.health().await {
                            Ok(health) => renderer.print_info(&format!(
                                "Service {} (version {})",
                                health.status,
                                health.version.as_deref().unwrap_or("unknown")
                            )),
                            Err(err) => renderer.print_error(&err.to_string()),
                        },
                        ChatCommand::ShowConfig => {
                            print_config(&config, &controller, &persona);
                        }
                        ChatCommand::Help => {
                            for line in help_text().lines() {
                                println!("    {}", line);
                            }
                        }
                        ChatCommand::Invalid(message) => {
                            renderer.print_error(&message);
                        }
                    }
                    continue;
                }

                // Regular message - send to the service
                converse(&controller, &mut events, &mut renderer, &persona, line).await;
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {}", err));
                break;
            }
        }
    }

    Ok(())
}

/// Run one turn, rendering lifecycle events while it is in flight.
async fn converse(
    controller: &Controller,
    events: &mut broadcast::Receiver<TurnEvent>,
    renderer: &mut dyn Renderer,
    persona: &PersonaId,
    line: &str,
) {
    let mut streamed = false;
    let mut reported = false;

    let turn = controller.submit(persona, line);
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            event = events.recv() => match event {
                Ok(event) => show(renderer, &event, &mut streamed, &mut reported),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "renderer fell behind; fragments dropped");
                }
                Err(broadcast::error::RecvError::Closed) => {}
            },
        }
    };
    while let Ok(event) = events.try_recv() {
        show(renderer, &event, &mut streamed, &mut reported);
    }

    // Turns rejected before they start produce no lifecycle events.
    if let Err(err) = result
        && !reported
    {
        renderer.print_error(&err.to_string());
    }
}

fn show(
    renderer: &mut dyn Renderer,
    event: &TurnEvent,
    streamed: &mut bool,
    reported: &mut bool,
) {
    *reported |= matches!(
        event,
        TurnEvent::Committed { .. } | TurnEvent::Failed { .. } | TurnEvent::Cancelled { .. }
    );
    render_event(renderer, event, streamed);
}

fn print_personas(personas: &[PersonaId], current: &PersonaId) {
    if personas.is_empty() {
        println!("    No conversations yet.");
        return;
    }
    println!("    Personas:");
    for persona in personas {
        let marker = if persona == current { "*" } else { " " };
        println!("      {marker} {persona}");
    }
}

fn print_config(config: &ChatConfig, controller: &Controller, persona: &PersonaId) {
    let options = controller.options();
    println!("    Current Configuration:");
    println!("      Server: {}", controller.transport().base_url());
    println!("      Persona: {}", persona);
    println!(
        "      Streaming: {}",
        if options.stream { "on" } else { "off" }
    );
    println!("      Temperature: {:.2}", options.temperature);
    println!("      Timeout: {}s", config.timeout.as_secs());
    println!("      Store: {}", config.store_path.display());
    println!("      User id: {}", config.user_id);
}
