//! LLM Client module for goalplanner
//!
//! Provides single-shot completion requests against Anthropic or OpenAI.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod openai;
mod retry;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use types::{CompletionRequest, CompletionResponse, Message, Role, StopReason, TokenUsage};

use crate::config::LlmConfig;

/// Create an LLM client based on the provider specified in config
///
/// Supports "anthropic" and "openai" providers.
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => {
            debug!("create_client: creating Anthropic client");
            Ok(Arc::new(AnthropicClient::from_config(config)?))
        }
        "openai" => {
            debug!("create_client: creating OpenAI client");
            Ok(Arc::new(OpenAIClient::from_config(config)?))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Unknown LLM provider: '{}'. Supported: anthropic, openai, none",
                other
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_client_unknown_provider() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
        assert!(err.to_string().contains("gemini"));
    }

    #[test]
    fn test_create_client_missing_key() {
        let config = LlmConfig {
            api_key_env: "GOALPLANNER_TEST_KEY_THAT_IS_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let err = create_client(&config).err().unwrap();
        assert!(matches!(err, LlmError::Config(_)));
    }
}
