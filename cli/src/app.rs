use anyhow::{Context, Result};
use bookchat_core::{ChatWidget, ExchangeState, SubmitOutcome};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::output::{print_error, print_interactive_help, print_messages, LiveMessage};

/// Spinner shown while a question is outstanding
fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
        .template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(120));
    spinner
}

/// Sends one question and prints everything the exchange appended after
/// the user's own message. A streamed answer is printed as it arrives.
async fn ask(widget: &ChatWidget, question: &str) -> SubmitOutcome {
    let before = widget.len();
    let spinner = spinner("Thinking...");
    let mut live = LiveMessage::new();
    let outcome = widget
        .submit_with_progress(question, &mut |message| {
            if !live.is_started() {
                spinner.finish_and_clear();
            }
            if let Err(e) = live.update(message) {
                debug!("Failed to write streamed output: {}", e);
            }
        })
        .await;
    spinner.finish_and_clear();

    match outcome {
        SubmitOutcome::Completed(state) => {
            debug!("Exchange finished in state {:?}", state);
            // Skip the echoed user message
            let appended = widget.messages_from(before + 1);
            live.finish(appended.iter().any(|m| live.shows(m)));
            let rest: Vec<_> = appended.into_iter().filter(|m| !live.shows(m)).collect();
            print_messages(&rest);
        }
        SubmitOutcome::Busy => println!("{}", "Still waiting for the previous answer.".yellow()),
        SubmitOutcome::Blank => {}
    }
    outcome
}

/// Runs a single query and reports whether it produced an answer
pub async fn run_single_query(widget: &ChatWidget, prompt: &str) -> Result<bool> {
    info!("Running single query: {}", prompt);

    match ask(widget, prompt).await {
        SubmitOutcome::Completed(ExchangeState::Done) => Ok(true),
        SubmitOutcome::Blank => {
            print_error("The question is empty.");
            Ok(false)
        }
        _ => Ok(false),
    }
}

/// Runs an interactive chat session with the assistant
pub async fn run_interactive_chat(widget: &ChatWidget) -> Result<()> {
    println!("Starting interactive chat with the book assistant.");
    println!("Type 'exit' or 'quit' to end the session, '/help' for commands.");
    println!();

    loop {
        if let Some(context) = widget.context() {
            println!("{} {}", "Context:".dimmed(), context.dimmed());
        }
        print!("{}: ", "You".green().bold());
        io::stdout().flush().context("Failed to flush stdout")?;

        let mut input = String::new();
        let read = io::stdin()
            .read_line(&mut input)
            .context("Failed to read input")?;
        if read == 0 {
            // EOF
            println!();
            break;
        }

        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit") {
            println!("Exiting chat session.");
            break;
        }

        if let Some(command) = input.strip_prefix('/') {
            run_command(widget, command).await;
            continue;
        }

        ask(widget, input).await;
    }

    Ok(())
}

async fn run_command(widget: &ChatWidget, command: &str) {
    let (name, rest) = command
        .split_once(char::is_whitespace)
        .map(|(name, rest)| (name, rest.trim()))
        .unwrap_or((command, ""));

    match name {
        "help" => print_interactive_help(),
        "session" => println!("Session: {}", widget.session_id().to_string().blue()),
        "clear" => {
            if widget.clear() {
                println!("Conversation cleared.");
            } else {
                println!("{}", "Cannot clear while waiting for an answer.".yellow());
            }
        }
        "context" => {
            if rest.is_empty() {
                widget.set_context(None);
                println!("Context cleared.");
            } else {
                widget.set_context(Some(rest.to_string()));
                println!("Context set for the next question.");
            }
        }
        "history" => {
            if let Err(e) = show_history(widget).await {
                error!("Failed to fetch history: {:#}", e);
                print_error(&format!("Could not fetch history: {:#}", e));
            }
        }
        other => println!("Unknown command '/{}'. Type /help for a list.", other),
    }
}

/// Prints what the backend stored for the widget's session
pub async fn show_history(widget: &ChatWidget) -> Result<()> {
    let spinner = spinner("Fetching history...");
    let history = widget.history().await;
    spinner.finish_and_clear();

    let messages = history.context("Failed to fetch session history")?;
    if messages.is_empty() {
        println!("No stored messages for session {}.", widget.session_id());
    } else {
        print_messages(&messages);
    }
    Ok(())
}

/// Ends the widget's session on the backend
pub async fn end_session(widget: &ChatWidget) -> Result<()> {
    let message = widget
        .end_session()
        .await
        .context("Failed to end session")?;
    println!("{} {}", widget.session_id().to_string().blue(), message);
    Ok(())
}
