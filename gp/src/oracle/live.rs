//! Oracle backed by an LLM client

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Oracle, OracleError, extract_json_object};
use crate::llm::{CompletionRequest, LlmClient, Message};

/// System prompt sent with every question
pub const SYSTEM_PROMPT: &str = "Return only JSON. No markdown.";

/// Forwards each question to an LLM as a single fresh completion
pub struct LlmOracle {
    llm: Arc<dyn LlmClient>,
    max_tokens: u32,
}

impl LlmOracle {
    pub fn new(llm: Arc<dyn LlmClient>, max_tokens: u32) -> Self {
        Self { llm, max_tokens }
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn ask(&self, prompt: &str) -> Result<Map<String, Value>, OracleError> {
        debug!(model = %self.llm.model(), prompt_len = prompt.len(), "LlmOracle::ask: called");
        let request = CompletionRequest {
            system_prompt: SYSTEM_PROMPT.to_string(),
            messages: vec![Message::user(prompt)],
            max_tokens: self.max_tokens,
            json_response: true,
        };

        let response = self.llm.complete(request).await.map_err(|e| {
            warn!(error = %e, "LlmOracle::ask: completion failed");
            OracleError::from(e)
        })?;
        debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "LlmOracle::ask: completion received"
        );

        if response.stop_reason.is_truncated() {
            return Err(OracleError::OutputInvalid("response truncated at max tokens".to_string()));
        }

        let text = response
            .content
            .ok_or_else(|| OracleError::OutputInvalid("empty response".to_string()))?;
        extract_json_object(&text)
    }
}
