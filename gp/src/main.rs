//! goalplanner - goal planning workflow
//!
//! CLI entry point: run single turns, chat interactively, or inspect config.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use goalplanner::adapter::Content;
use goalplanner::cli::{Cli, Command, OutputFormat, get_log_path};
use goalplanner::config::Config;
use goalplanner::domain::SessionState;
use goalplanner::oracle::create_oracle;
use goalplanner::prompts::PromptLoader;
use goalplanner::repl;
use goalplanner::workflow::{Signals, TurnInput, TurnOutcome, Workflow};

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from("."));

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Determine log level with priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::File::create(&log_path).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load log level from config file early (before full config load)
    let config_log_level = Config::load_log_level(cli.config.as_ref());

    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    let strict = cli.strict || config.strict();
    info!(provider = %config.llm.provider, model = %config.llm.model, strict, "goalplanner loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Some(Command::Turn {
            message,
            content,
            state,
            signals,
            format,
        }) => {
            let workflow = build_workflow(&config, strict);
            cmd_turn(&workflow, message, content, state, signals, format).await
        }
        Some(Command::Chat) => {
            let workflow = build_workflow(&config, strict);
            repl::run_interactive(Arc::new(workflow)).await
        }
        Some(Command::Config) => cmd_config(&config, strict),
        None => {
            let workflow = build_workflow(&config, strict);
            repl::run_interactive(Arc::new(workflow)).await
        }
    }
}

fn build_workflow(config: &Config, strict: bool) -> Workflow {
    debug!(strict, "build_workflow: called");
    let oracle = create_oracle(&config.llm);
    let prompts = PromptLoader::new(config.workflow.prompts_dir.as_deref());
    Workflow::new(oracle, Arc::new(prompts), strict)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = fs::read_to_string(path).context(format!("Failed to read {} file {}", what, path.display()))?;
    serde_json::from_str(&content).context(format!("Failed to parse {} file {}", what, path.display()))
}

async fn cmd_turn(
    workflow: &Workflow,
    message: Option<String>,
    content: Option<PathBuf>,
    state_path: Option<PathBuf>,
    signals_path: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    debug!(?message, ?content, ?state_path, ?signals_path, "cmd_turn: called");

    let mut input = match content {
        Some(path) => read_json::<Content>(&path, "content")?.into_turn_input(),
        None => TurnInput::new(message.unwrap_or_default()),
    };
    if let Some(path) = &signals_path {
        input.signals = Some(read_json::<Signals>(path, "signals")?);
    }

    let state = match &state_path {
        Some(path) if path.exists() => read_json::<SessionState>(path, "state")?,
        _ => SessionState::default(),
    };

    let outcome = workflow.run_turn(&input, state).await?;

    if let Some(path) = &state_path {
        let json = serde_json::to_string_pretty(&outcome.state).context("Failed to serialize state")?;
        fs::write(path, json).context(format!("Failed to write state file {}", path.display()))?;
        info!(path = %path.display(), "Saved session state");
    }

    match format {
        OutputFormat::Json => print_json(&outcome),
        OutputFormat::Text => {
            print_text(&outcome);
            Ok(())
        }
    }
}

fn print_json(outcome: &TurnOutcome) -> Result<()> {
    let value = serde_json::json!({
        "events": outcome.events,
        "finalResponse": outcome.response,
    });
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

fn print_text(outcome: &TurnOutcome) {
    for event in &outcome.events {
        let keys: Vec<&str> = event.state_delta.keys().map(String::as_str).collect();
        println!("{} {}", format!("[{}]", event.stage_name).cyan(), keys.join(", ").dimmed());
    }
    println!();
    println!("{}", outcome.response.reply.bold());
    if let Some(plan) = &outcome.state.proposed_plan {
        println!();
        print!("{}", plan.outline());
    }
    println!();
    println!(
        "action: {}  iteration: {}  step: {}  active: {}",
        outcome.response.action.action_type.to_string().yellow(),
        outcome.response.state.iteration,
        outcome.response.state.step,
        outcome.response.state.session_active
    );
}

fn cmd_config(config: &Config, strict: bool) -> Result<()> {
    debug!("cmd_config: called");
    let mut effective = config.clone();
    effective.workflow.strict = strict;
    print!("{}", serde_yaml::to_string(&effective).context("Failed to serialize config")?);
    Ok(())
}
