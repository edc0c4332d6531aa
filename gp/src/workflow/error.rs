//! Workflow error types

use thiserror::Error;

use super::StageEvent;
use crate::domain::SessionState;

/// Errors that abort a turn in strict mode
///
/// In lenient mode every one of these is recovered by a stage fallback and
/// only shows up in the logs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{stage}: oracle unavailable")]
    OracleUnavailable { stage: String },

    #[error("{stage}: oracle invocation failed: {reason}")]
    OracleInvocationFailed { stage: String, reason: String },

    #[error("{stage}: oracle output invalid: {reason}")]
    OracleOutputInvalid { stage: String, reason: String },

    #[error("{stage}: state invariant violated: {reason}")]
    StateInvariantViolation { stage: String, reason: String },
}

impl WorkflowError {
    /// Name of the stage that raised the error
    pub fn stage(&self) -> &str {
        match self {
            Self::OracleUnavailable { stage }
            | Self::OracleInvocationFailed { stage, .. }
            | Self::OracleOutputInvalid { stage, .. }
            | Self::StateInvariantViolation { stage, .. } => stage,
        }
    }
}

/// A turn that stopped before finalization
///
/// Carries the state as of the last completed stage and the events emitted
/// so far. Earlier stage results are not rolled back; the host decides
/// whether to keep them.
#[derive(Debug, Error)]
#[error("turn aborted: {error}")]
pub struct TurnAborted {
    #[source]
    pub error: WorkflowError,
    pub state: Box<SessionState>,
    pub events: Vec<StageEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_stage() {
        let err = WorkflowError::OracleInvocationFailed {
            stage: "approval".to_string(),
            reason: "timeout".to_string(),
        };
        assert_eq!(err.to_string(), "approval: oracle invocation failed: timeout");
        assert_eq!(err.stage(), "approval");
    }

    #[test]
    fn test_turn_aborted_source() {
        use std::error::Error as _;

        let aborted = TurnAborted {
            error: WorkflowError::OracleUnavailable {
                stage: "finalize".to_string(),
            },
            state: Box::default(),
            events: vec![],
        };
        assert!(aborted.to_string().contains("finalize: oracle unavailable"));
        assert!(aborted.source().is_some());
    }
}
