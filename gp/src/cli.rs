//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// goalplanner - turn a goal statement into a plan, one turn at a time
#[derive(Parser)]
#[command(
    name = "gp",
    about = "Three-stage goal planning workflow over an LLM oracle",
    version,
    after_help = after_help()
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Abort the turn instead of falling back when the oracle misbehaves
    #[arg(long, global = true)]
    pub strict: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a single turn and print the stage events
    Turn {
        /// User message (ignored when --content is given)
        message: Option<String>,

        /// JSON file with transport content (`parts` with text and function calls)
        #[arg(long, value_name = "FILE")]
        content: Option<PathBuf>,

        /// JSON session state file; read before the turn and rewritten after it
        #[arg(short, long, value_name = "FILE")]
        state: Option<PathBuf>,

        /// JSON signals file (`proposedPlan`, `availableHoursLeft`, `upcomingTasks`)
        #[arg(long, value_name = "FILE")]
        signals: Option<PathBuf>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Start an interactive planning session
    Chat,

    /// Print the effective configuration
    Config,
}

/// Output format for turn results
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "OutputFormat::from_str: called");
        match s.to_lowercase().as_str() {
            "text" | "plain" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => {
                debug!("OutputFormat::from_str: unknown format");
                Err(format!("Unknown format: {}. Use text or json", s))
            }
        }
    }
}

/// Where the log file is written
pub fn get_log_path() -> PathBuf {
    debug!("get_log_path: called");
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("goalplanner")
        .join("logs")
        .join("goalplanner.log")
}

fn after_help() -> String {
    format!(
        "Set {}=1 to force strict mode.\nLogs are written to: {}",
        crate::config::STRICT_ENV,
        get_log_path().display()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parse() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TEXT".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("plain".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("table".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_parse_turn_command() {
        let cli = Cli::try_parse_from(["gp", "--strict", "turn", "learn piano", "--state", "s.json", "-f", "json"])
            .unwrap();
        assert!(cli.strict);
        match cli.command {
            Some(Command::Turn {
                message, state, format, ..
            }) => {
                assert_eq!(message.as_deref(), Some("learn piano"));
                assert_eq!(state, Some(PathBuf::from("s.json")));
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["gp", "chat", "-l", "debug", "--config", "x.yml"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Chat)));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
        assert!(!cli.strict);
    }

    #[test]
    fn test_log_path() {
        assert!(get_log_path().ends_with("goalplanner/logs/goalplanner.log"));
    }
}
