//! Workflow stages
//!
//! Each stage reads the session state, asks the oracle one question, checks
//! the answer, and falls back to a deterministic result when the answer is
//! missing or unusable. Stages never mutate the state they are given; they
//! return the next state together with the keys they changed.

mod approval;
mod finalize;
mod plan;

use async_trait::async_trait;
use tracing::warn;

pub use approval::{ApprovalStage, heuristic_decision, parse_routing_decision};
pub use finalize::{FinalizeStage, enrich_payload, fallback_response, normalize_response};
pub use plan::PlanStage;

use crate::domain::{SessionState, StateDelta};
use crate::oracle::OracleError;
use crate::workflow::{TurnInput, WorkflowError};

/// Result of running one stage
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// Session state after the stage
    pub state: SessionState,
    /// Human-readable output, usually the stage's JSON result
    pub summary: String,
    /// Keys the stage changed
    pub delta: StateDelta,
}

/// One step of the turn pipeline
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stable name used in events and errors
    fn name(&self) -> &'static str;

    /// Run the stage against the state left by the previous one
    async fn run(&self, state: &SessionState, input: &TurnInput) -> Result<StageOutcome, WorkflowError>;
}

/// Why a stage used its fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// The oracle produced nothing
    Oracle(OracleError),
    /// The oracle answered with the wrong shape
    Invalid(String),
    /// The oracle answered with a well-formed but illegal result
    Illegal(String),
}

impl FallbackReason {
    /// The strict-mode error for this reason
    pub fn into_error(self, stage: &str) -> WorkflowError {
        let stage = stage.to_string();
        match self {
            Self::Oracle(OracleError::Unavailable) => WorkflowError::OracleUnavailable { stage },
            Self::Oracle(OracleError::InvocationFailed(reason)) => WorkflowError::OracleInvocationFailed { stage, reason },
            Self::Oracle(OracleError::OutputInvalid(reason)) | Self::Invalid(reason) => {
                WorkflowError::OracleOutputInvalid { stage, reason }
            }
            Self::Illegal(reason) => WorkflowError::StateInvariantViolation { stage, reason },
        }
    }

    /// Log the fallback at warn level
    pub(crate) fn log(&self, stage: &str) {
        warn!(%stage, reason = %self, "Using deterministic fallback");
    }
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oracle(e) => write!(f, "{}", e),
            Self::Invalid(reason) => write!(f, "invalid output: {}", reason),
            Self::Illegal(reason) => write!(f, "illegal output: {}", reason),
        }
    }
}

impl From<OracleError> for FallbackReason {
    fn from(err: OracleError) -> Self {
        Self::Oracle(err)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted oracle shared by the stage tests

    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::Mutex;

    use crate::oracle::{Oracle, OracleError};

    /// Returns scripted answers in order; `Unavailable` once exhausted
    pub struct ScriptedOracle {
        answers: Mutex<Vec<Result<Value, OracleError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedOracle {
        pub fn new(answers: Vec<Result<Value, OracleError>>) -> Self {
            let mut answers = answers;
            answers.reverse();
            Self {
                answers: Mutex::new(answers),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn answering(value: Value) -> Self {
            Self::new(vec![Ok(value)])
        }

        pub fn failing(err: OracleError) -> Self {
            Self::new(vec![Err(err)])
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Oracle for ScriptedOracle {
        async fn ask(&self, prompt: &str) -> Result<Map<String, Value>, OracleError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.answers.lock().unwrap().pop() {
                Some(Ok(Value::Object(map))) => Ok(map),
                Some(Ok(other)) => Err(OracleError::OutputInvalid(format!("not an object: {}", other))),
                Some(Err(e)) => Err(e),
                None => Err(OracleError::Unavailable),
            }
        }
    }
}
