use std::sync::Arc;

use anyhow::Result;
use colored::Colorize;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use crate::controller::{SendError, SendOutcome, SessionController};
use crate::session::SessionState;

/// One line of user input, classified. Pure so it can be tested without a
/// terminal; suggestion numbers are resolved against live state by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Text(String),
    Suggestion(usize),
    Clear,
    Logout,
    Help,
    Quit,
    Empty,
}

pub fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Input::Empty;
    }
    match trimmed {
        "/clear" => Input::Clear,
        "/logout" => Input::Logout,
        "/help" => Input::Help,
        "/quit" | "quit" | "exit" => Input::Quit,
        _ => match trimmed.parse::<usize>() {
            Ok(n) => Input::Suggestion(n),
            Err(_) => Input::Text(trimmed.to_string()),
        },
    }
}

/// Question text of the n-th listed suggestion (1-based), if any.
pub fn suggestion_text(state: &SessionState, choice: usize) -> Option<String> {
    if choice == 0 {
        return None;
    }
    state.related.values().nth(choice - 1).cloned()
}

pub async fn run(controller: Arc<SessionController>) -> Result<()> {
    let mut editor = DefaultEditor::new()?;

    println!("{}", "=== HR assistant ===".bright_magenta().bold());
    println!(
        "{}",
        "Ask a question, or type /help for commands.".bright_black()
    );
    println!();

    loop {
        match editor.readline("you> ") {
            Ok(line) => {
                let _ = editor.add_history_entry(&line);
                match parse_input(&line) {
                    Input::Empty => continue,
                    Input::Quit => break,
                    Input::Help => print_help(),
                    Input::Clear => {
                        controller.clear().await;
                        println!("{}", "Conversation cleared.".bright_black());
                    }
                    Input::Logout => {
                        controller.logout().await?;
                        println!("{}", "Logged out. Run `hrchat login` to sign back in.".green());
                        break;
                    }
                    Input::Suggestion(n) => {
                        let state = controller.state().await;
                        match suggestion_text(&state, n) {
                            Some(question) => {
                                // A picked suggestion submits its question
                                // text; echo what is actually being asked.
                                println!("{}", format!("you> {question}").green());
                                if !submit(&controller, &question).await? {
                                    break;
                                }
                            }
                            // Not a live suggestion number: plain text.
                            None => {
                                if !submit(&controller, line.trim()).await? {
                                    break;
                                }
                            }
                        }
                    }
                    Input::Text(text) => {
                        if !submit(&controller, &text).await? {
                            break;
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "Interrupted. Type 'quit' to exit.".yellow());
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err.into()),
        }
    }

    Ok(())
}

/// Sends one message and renders the outcome. Returns false when the session
/// can no longer continue and the loop should end.
async fn submit(controller: &SessionController, text: &str) -> Result<bool> {
    match controller.send_message(text).await {
        Ok(SendOutcome::Replied(bot)) => {
            println!("{}", format!("bot> {}", bot.text).bright_blue());
            let state = controller.state().await;
            if let Some(related) = state.suggestions_for(bot.id) {
                println!("{}", "Related questions:".bright_black());
                for (i, question) in related.values().enumerate() {
                    println!("{}", format!("  {}) {question}", i + 1).bright_black());
                }
                println!("{}", "Enter a number to ask one.".bright_black());
            }
            Ok(true)
        }
        Ok(SendOutcome::Failed(description)) => {
            println!("{}", description.red());
            Ok(true)
        }
        // Only a concurrent reset produces this; nothing to render.
        Ok(SendOutcome::Cancelled) => Ok(true),
        Err(SendError::NotAuthenticated) => {
            println!(
                "{}",
                "Your session has ended. Run `hrchat login` to sign back in.".yellow()
            );
            Ok(false)
        }
        // Unreachable from this loop: it awaits every send to completion.
        Err(SendError::Busy) => {
            println!("{}", SendError::Busy.to_string().yellow());
            Ok(true)
        }
        Err(err @ SendError::TokenStore(_)) => Err(err.into()),
    }
}

fn print_help() {
    println!("{}", "Commands:".bright_black());
    println!("{}", "  /clear    start the conversation over".bright_black());
    println!("{}", "  /logout   delete the stored token and exit".bright_black());
    println!("{}", "  quit      leave the chat".bright_black());
    println!(
        "{}",
        "Anything else is sent to the assistant; a bare number picks a related question."
            .bright_black()
    );
}
