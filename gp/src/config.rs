//! goalplanner configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that forces strict mode on
pub const STRICT_ENV: &str = "GOALPLANNER_STRICT";

/// Main goalplanner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Workflow behavior
    pub workflow: WorkflowConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level", skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .goalplanner.yml
        let local_config = PathBuf::from(".goalplanner.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/goalplanner/goalplanner.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("goalplanner").join("goalplanner.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is initialized
    ///
    /// Errors are swallowed here; `load` reports them once logging is up.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        let candidates = match config_path {
            Some(path) => vec![path.clone()],
            None => {
                let mut paths = vec![PathBuf::from(".goalplanner.yml")];
                if let Some(config_dir) = dirs::config_dir() {
                    paths.push(config_dir.join("goalplanner").join("goalplanner.yml"));
                }
                paths
            }
        };

        candidates
            .iter()
            .find(|p| p.exists())
            .and_then(|p| fs::read_to_string(p).ok())
            .and_then(|content| serde_yaml::from_str::<Config>(&content).ok())
            .and_then(|config| config.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Whether strict mode is on, from config or the environment
    pub fn strict(&self) -> bool {
        self.workflow.strict || strict_from_env()
    }
}

/// True when the strict-mode environment variable holds a truthy value
pub fn strict_from_env() -> bool {
    std::env::var(STRICT_ENV)
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name ("anthropic", "openai", or "none" to run without an oracle)
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            max_tokens: 4096,
            timeout_ms: 60_000,
        }
    }
}

impl LlmConfig {
    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String> {
        let key = std::env::var(&self.api_key_env)
            .map_err(|_| eyre::eyre!("LLM API key not found. Set the {} environment variable.", self.api_key_env))?;
        if key.trim().is_empty() {
            return Err(eyre::eyre!("LLM API key in {} is empty", self.api_key_env));
        }
        Ok(key)
    }
}

/// Workflow behavior
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Abort the turn instead of falling back when the oracle misbehaves
    pub strict: bool,

    /// Directory whose `{name}.pmt` files override the embedded prompts
    #[serde(rename = "prompts-dir", skip_serializing_if = "Option::is_none")]
    pub prompts_dir: Option<PathBuf>,
}
