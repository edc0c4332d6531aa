//! Plan stage: generate or refine the proposed plan

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use super::{FallbackReason, Stage, StageOutcome};
use crate::domain::{Plan, PlanDraft, Routing, SessionState, StateDelta};
use crate::oracle::{Oracle, OracleError};
use crate::prompts::{PlanPrompt, PromptLoader};
use crate::workflow::{TurnInput, WorkflowError};

/// Summary emitted when approval routed straight to finalization
pub const SKIP_SUMMARY: &str = "Routing skip: finalize_only";

/// Produces a structurally complete plan for every planning turn
pub struct PlanStage {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
    strict: bool,
}

impl PlanStage {
    pub const NAME: &'static str = "plan";

    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>, strict: bool) -> Self {
        Self { oracle, prompts, strict }
    }

    /// Whether a fallback for this reason should abort in strict mode
    ///
    /// An unavailable oracle is an expected deployment, not a failure.
    fn is_fatal(&self, reason: &FallbackReason) -> bool {
        self.strict && !matches!(reason, FallbackReason::Oracle(OracleError::Unavailable))
    }

    async fn ask(&self, message: &str, state: &SessionState) -> Result<Plan, FallbackReason> {
        let context = state.context.clone().unwrap_or_default();
        let existing: Option<Value> = match (&state.proposed_plan, &context.goal_preview) {
            (Some(plan), _) => serde_json::to_value(plan).ok(),
            (None, Some(preview)) => serde_json::to_value(preview).ok(),
            (None, None) => None,
        };
        let existing_plan_json = existing
            .as_ref()
            .and_then(|v| serde_json::to_string_pretty(v).ok())
            .unwrap_or_else(|| "null".to_string());

        let prompt = self
            .prompts
            .render(
                "plan",
                &PlanPrompt {
                    message: message.to_string(),
                    existing_plan_json,
                    has_existing_plan: existing.is_some(),
                    available_hours: context.available_hours_left,
                    upcoming_tasks_json: serde_json::to_string(&context.upcoming_tasks)
                        .unwrap_or_else(|_| "[]".to_string()),
                },
            )
            .map_err(|e| FallbackReason::Oracle(OracleError::InvocationFailed(format!("prompt: {}", e))))?;

        let answer = self.oracle.ask(&prompt).await?;
        let mut plan =
            Plan::from_value(&Value::Object(answer)).map_err(|e| FallbackReason::Invalid(e.to_string()))?;

        if plan.id.is_none() {
            plan.id = state.proposed_plan.as_ref().and_then(|p| p.id.clone());
        }
        Ok(plan)
    }

    /// Deterministic plan built from whatever the state already holds
    fn fallback_plan(message: &str, state: &SessionState) -> Plan {
        debug!("PlanStage::fallback_plan: called");
        let base = match (&state.proposed_plan, state.context.as_ref().and_then(|c| c.goal_preview.as_ref())) {
            (Some(plan), _) => PlanDraft::from(plan.clone()),
            (None, Some(preview)) => preview.clone(),
            (None, None) => PlanDraft::default(),
        };
        base.complete_with(message)
    }
}

#[async_trait]
impl Stage for PlanStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, state: &SessionState, _input: &TurnInput) -> Result<StageOutcome, WorkflowError> {
        debug!(routing = %state.routing(), has_plan = state.has_plan(), "PlanStage::run: called");
        let mut next = state.clone();
        let mut delta = StateDelta::new();

        let mut routing = next.routing();
        if routing == Routing::FinalizeOnly && !next.has_plan() {
            debug!("PlanStage::run: finalize_only without plan, coercing to needs_planning");
            routing = Routing::NeedsPlanning;
            next.routing = Some(routing);
            delta.set("routing", &routing);
        }

        if routing == Routing::FinalizeOnly {
            info!("Plan stage skipped, routing is finalize_only");
            return Ok(StageOutcome {
                state: next,
                summary: SKIP_SUMMARY.to_string(),
                delta,
            });
        }

        let message = next.user_goal_text.clone().unwrap_or_default();
        let plan = match self.ask(&message, &next).await {
            Ok(plan) => plan,
            Err(reason) => {
                reason.log(Self::NAME);
                if self.is_fatal(&reason) {
                    return Err(reason.into_error(Self::NAME));
                }
                Self::fallback_plan(&message, &next)
            }
        };
        info!(
            goal = %plan.goal.title,
            milestones = plan.milestones.len(),
            tasks = plan.task_count(),
            "Plan proposed"
        );

        delta.set("proposedPlan", &plan);
        let summary = serde_json::to_string(&plan).unwrap_or_default();
        next.proposed_plan = Some(plan);

        Ok(StageOutcome {
            state: next,
            summary,
            delta,
        })
    }
}
