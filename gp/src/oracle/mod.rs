//! Oracle interface
//!
//! The workflow asks an external reasoning service for JSON objects and
//! treats whatever comes back as untrusted. Which implementation is used is
//! decided once, when the workflow is built; stages never check config.

mod json;
mod live;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use json::extract_json_object;
pub use live::LlmOracle;

use crate::config::LlmConfig;
use crate::llm::{self, LlmError};

/// Why an oracle call produced nothing usable
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("oracle unavailable")]
    Unavailable,

    #[error("oracle invocation failed: {0}")]
    InvocationFailed(String),

    #[error("oracle output invalid: {0}")]
    OutputInvalid(String),
}

impl From<LlmError> for OracleError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::InvalidResponse(msg) => OracleError::OutputInvalid(msg),
            other => OracleError::InvocationFailed(other.to_string()),
        }
    }
}

/// A JSON-producing reasoning service
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Ask one question; on success the answer is always a JSON object
    async fn ask(&self, prompt: &str) -> Result<Map<String, Value>, OracleError>;
}

/// Oracle that is never available and never touches the network
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableOracle;

#[async_trait]
impl Oracle for UnavailableOracle {
    async fn ask(&self, _prompt: &str) -> Result<Map<String, Value>, OracleError> {
        debug!("UnavailableOracle::ask: called");
        Err(OracleError::Unavailable)
    }
}

/// Choose the oracle for this process
///
/// Provider `none`, a missing API key, or an unknown provider all yield the
/// unavailable oracle; the workflow then runs entirely on fallbacks.
pub fn create_oracle(config: &LlmConfig) -> Arc<dyn Oracle> {
    debug!(provider = %config.provider, "create_oracle: called");
    if config.provider == "none" {
        info!("LLM provider disabled, running with fallbacks only");
        return Arc::new(UnavailableOracle);
    }

    match llm::create_client(config) {
        Ok(client) => {
            info!(provider = %config.provider, model = %client.model(), "Using live oracle");
            Arc::new(LlmOracle::new(client, config.max_tokens))
        }
        Err(e) => {
            warn!(provider = %config.provider, error = %e, "LLM client unavailable, running with fallbacks only");
            Arc::new(UnavailableOracle)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_unavailable_oracle() {
        let oracle = UnavailableOracle;
        assert_eq!(oracle.ask("anything").await, Err(OracleError::Unavailable));
    }

    #[test]
    fn test_llm_error_mapping() {
        let invalid: OracleError = LlmError::InvalidResponse("bad body".to_string()).into();
        assert_eq!(invalid, OracleError::OutputInvalid("bad body".to_string()));

        let rate_limited: OracleError = LlmError::RateLimited {
            retry_after: Duration::from_secs(5),
        }
        .into();
        assert!(matches!(rate_limited, OracleError::InvocationFailed(_)));

        let api: OracleError = LlmError::ApiError {
            status: 500,
            message: "oops".to_string(),
        }
        .into();
        assert!(matches!(api, OracleError::InvocationFailed(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn test_create_oracle_none_provider() {
        let config = LlmConfig {
            provider: "none".to_string(),
            ..LlmConfig::default()
        };
        let oracle = create_oracle(&config);
        assert_eq!(oracle.ask("x").await, Err(OracleError::Unavailable));
    }

    #[tokio::test]
    async fn test_create_oracle_missing_key() {
        let config = LlmConfig {
            api_key_env: "GOALPLANNER_ORACLE_TEST_KEY_NEVER_SET".to_string(),
            ..LlmConfig::default()
        };
        let oracle = create_oracle(&config);
        assert_eq!(oracle.ask("x").await, Err(OracleError::Unavailable));
    }

    #[tokio::test]
    async fn test_create_oracle_unknown_provider() {
        let config = LlmConfig {
            provider: "gemini".to_string(),
            ..LlmConfig::default()
        };
        let oracle = create_oracle(&config);
        assert_eq!(oracle.ask("x").await, Err(OracleError::Unavailable));
    }
}
