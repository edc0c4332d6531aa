//! Chat session management

use std::sync::Arc;

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tracing::{Instrument, debug, info, info_span};
use uuid::Uuid;

use crate::domain::{ActionType, SessionState};
use crate::workflow::{TurnInput, TurnOutcome, Workflow};

/// Interactive multi-turn session
pub struct ChatSession {
    id: Uuid,
    workflow: Arc<Workflow>,
    state: SessionState,
    turns: u32,
}

/// What the loop should do after a slash command
#[derive(Debug, PartialEq, Eq)]
enum SlashResult {
    Continue,
    Quit,
}

impl ChatSession {
    /// Create a new session with empty state
    pub fn new(workflow: Arc<Workflow>) -> Self {
        let id = Uuid::now_v7();
        debug!(%id, "ChatSession::new: called");
        Self {
            id,
            workflow,
            state: SessionState::default(),
            turns: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Run one turn and commit its state
    ///
    /// An aborted turn commits nothing; the previous state is kept.
    pub async fn turn(&mut self, message: &str) -> Result<TurnOutcome> {
        self.turns += 1;
        let span = info_span!("turn", session = %self.id, turn = self.turns);
        let input = TurnInput::new(message);
        let result = self
            .workflow
            .run_turn(&input, self.state.clone())
            .instrument(span)
            .await;

        match result {
            Ok(outcome) => {
                self.state = outcome.state.clone();
                Ok(outcome)
            }
            Err(aborted) => {
                info!(session = %self.id, error = %aborted.error, "Turn aborted, state unchanged");
                Err(aborted.into())
            }
        }
    }

    /// Run the read-eval-print loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            match rl.readline(&format!("{} ", ">".bright_green())) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        if self.handle_slash_command(input) == SlashResult::Quit {
                            break;
                        }
                        continue;
                    }

                    match self.turn(input).await {
                        Ok(outcome) => self.print_outcome(&outcome),
                        Err(e) => println!("{} {}", "!".red(), e),
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "goalplanner chat".bright_cyan().bold());
        if self.workflow.strict() {
            println!("{}", "strict mode: oracle failures abort the turn".yellow());
        }
        println!("Describe a goal. Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    fn print_outcome(&self, outcome: &TurnOutcome) {
        for event in &outcome.events {
            debug!(stage = %event.stage_name, keys = event.state_delta.len(), "print_outcome: event");
        }
        println!("{}", outcome.response.reply.bright_blue());
        if outcome.response.action.action_type == ActionType::SavePreview {
            if let Some(plan) = &outcome.state.proposed_plan {
                print!("{}", plan.outline().dimmed());
            }
        }
        println!(
            "{}",
            format!(
                "[{} | iteration {} | {}]",
                outcome.response.action.action_type, outcome.state.iteration, outcome.response.state.step
            )
            .dimmed()
        );
    }

    fn handle_slash_command(&mut self, input: &str) -> SlashResult {
        let cmd = input.split_whitespace().next().unwrap_or("");

        match cmd {
            "/help" | "/h" => {
                self.print_help();
                SlashResult::Continue
            }
            "/quit" | "/q" | "/exit" => SlashResult::Quit,
            "/state" => {
                match serde_json::to_string_pretty(&self.state) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("{} {}", "!".red(), e),
                }
                SlashResult::Continue
            }
            "/plan" => {
                match &self.state.proposed_plan {
                    Some(plan) => print!("{}", plan.outline()),
                    None => println!("{}", "No plan yet.".dimmed()),
                }
                SlashResult::Continue
            }
            "/reset" => {
                self.state = SessionState::default();
                println!("{}", "Session state cleared.".dimmed());
                SlashResult::Continue
            }
            _ => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                SlashResult::Continue
            }
        }
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:14} Show this help", "/help".yellow());
        println!("  {:14} Exit the session", "/quit".yellow());
        println!("  {:14} Show the session state as JSON", "/state".yellow());
        println!("  {:14} Show the current plan outline", "/plan".yellow());
        println!("  {:14} Start over with empty state", "/reset".yellow());
        println!();
    }
}
