//! Workflow orchestrator
//!
//! Runs approval, plan and finalization in that order for one turn, threading
//! the session state from stage to stage and recording an event after each.

mod error;
mod event;
mod input;

use std::sync::Arc;

use tracing::{debug, info, warn};

pub use error::{TurnAborted, WorkflowError};
pub use event::StageEvent;
pub use input::{Signals, TurnInput};

use crate::domain::{FinalResponse, SessionState};
use crate::oracle::Oracle;
use crate::prompts::PromptLoader;
use crate::stages::{ApprovalStage, FinalizeStage, PlanStage, Stage};

/// Result of a completed turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// State to persist for the next turn
    pub state: SessionState,
    /// One event per stage, in order
    pub events: Vec<StageEvent>,
    /// Reply, action and state produced by finalization
    pub response: FinalResponse,
}

/// The three-stage turn pipeline
pub struct Workflow {
    stages: Vec<Box<dyn Stage>>,
    strict: bool,
}

impl Workflow {
    /// Build the pipeline around one oracle
    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>, strict: bool) -> Self {
        debug!(strict, "Workflow::new: called");
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ApprovalStage::new(oracle.clone(), prompts.clone(), strict)),
            Box::new(PlanStage::new(oracle.clone(), prompts.clone(), strict)),
            Box::new(FinalizeStage::new(oracle, prompts, strict)),
        ];
        Self { stages, strict }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Names of the stages in run order
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    /// Run one turn
    ///
    /// In lenient mode this always completes. In strict mode the first stage
    /// error stops the turn; the error carries the state as of the last
    /// completed stage.
    pub async fn run_turn(&self, input: &TurnInput, state: SessionState) -> Result<TurnOutcome, TurnAborted> {
        debug!(message_len = input.message.len(), iteration = state.iteration, "Workflow::run_turn: called");
        let mut state = state;
        let mut events = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            debug!(stage = stage.name(), "Workflow::run_turn: running stage");
            match stage.run(&state, input).await {
                Ok(outcome) => {
                    events.push(StageEvent::new(stage.name(), outcome.summary, outcome.delta));
                    state = outcome.state;
                }
                Err(error) => {
                    warn!(stage = stage.name(), error = %error, "Turn aborted");
                    return Err(TurnAborted {
                        error,
                        state: Box::new(state),
                        events,
                    });
                }
            }
        }

        let Some(response) = state.final_response.clone() else {
            return Err(TurnAborted {
                error: WorkflowError::StateInvariantViolation {
                    stage: FinalizeStage::NAME.to_string(),
                    reason: "finalization produced no response".to_string(),
                },
                state: Box::new(state),
                events,
            });
        };

        info!(
            action = %response.action.action_type,
            iteration = state.iteration,
            "Turn complete"
        );
        Ok(TurnOutcome { state, events, response })
    }
}
