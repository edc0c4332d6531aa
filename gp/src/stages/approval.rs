//! Approval stage: did the user approve the plan, or ask for more planning?

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{FallbackReason, Stage, StageOutcome};
use crate::domain::{Routing, RoutingDecision, SessionState, StateDelta, TurnContext};
use crate::oracle::{Oracle, OracleError};
use crate::prompts::{ApprovalPrompt, PromptLoader};
use crate::workflow::{TurnInput, WorkflowError};

/// Phrases that signal approval
const POSITIVE_TOKENS: [&str; 7] = ["approve", "looks good", "yes", "okay", "save", "go ahead", "ship it"];

/// Phrases that cancel an approval
const NEGATOR_TOKENS: [&str; 7] = ["but", "however", "not yet", "change", "adjust", "later", "instead"];

/// Reason recorded when the oracle gives none
pub const ORACLE_REASON: &str = "LLM routing result";

/// Keyword fallback for routing
///
/// Pure function of its inputs. Matching is by substring on the lower-cased
/// message, so "but" also matches inside longer words.
pub fn heuristic_decision(message: &str, has_plan: bool) -> RoutingDecision {
    debug!(has_plan, "heuristic_decision: called");
    let text = message.to_lowercase();
    let positive = POSITIVE_TOKENS.iter().any(|token| text.contains(token));
    let negative = NEGATOR_TOKENS.iter().any(|token| text.contains(token));

    let detected_consent = positive && !negative;
    let routing = if detected_consent && has_plan {
        Routing::FinalizeOnly
    } else {
        Routing::NeedsPlanning
    };
    let reason = if detected_consent {
        "Heuristic approval detected"
    } else {
        "Defaulting to further planning"
    };

    RoutingDecision {
        routing,
        detected_consent,
        reason: reason.to_string(),
    }
}

/// Accept the oracle's routing answer or reject it whole
///
/// `routing` and `detectedConsent` must both be valid; `reason` is optional.
/// A `finalize_only` answer without a plan is downgraded to `needs_planning`.
pub fn parse_routing_decision(answer: &Map<String, Value>, has_plan: bool) -> Result<RoutingDecision, FallbackReason> {
    debug!(has_plan, "parse_routing_decision: called");
    let routing = answer
        .get("routing")
        .and_then(Value::as_str)
        .and_then(Routing::parse)
        .ok_or_else(|| FallbackReason::Invalid("routing must be 'finalize_only' or 'needs_planning'".to_string()))?;
    let detected_consent = answer
        .get("detectedConsent")
        .and_then(Value::as_bool)
        .ok_or_else(|| FallbackReason::Invalid("detectedConsent must be a boolean".to_string()))?;

    let routing = if routing == Routing::FinalizeOnly && !has_plan {
        debug!("parse_routing_decision: no plan, downgrading finalize_only");
        Routing::NeedsPlanning
    } else {
        routing
    };

    let reason = answer
        .get("reason")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(ORACLE_REASON)
        .to_string();

    Ok(RoutingDecision {
        routing,
        detected_consent,
        reason,
    })
}

/// Classifies the message into a routing decision
pub struct ApprovalStage {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
    strict: bool,
}

impl ApprovalStage {
    pub const NAME: &'static str = "approval";

    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>, strict: bool) -> Self {
        Self { oracle, prompts, strict }
    }

    /// Mirror host signals into the state, promoting a complete plan preview
    fn sync_context(&self, state: &mut SessionState, input: &TurnInput, delta: &mut StateDelta) {
        let Some(signals) = &input.signals else {
            debug!("sync_context: no signals");
            if state.context.take().is_some() {
                debug!("sync_context: dropping previous turn's context");
                delta.clear("context");
            }
            return;
        };

        let context: TurnContext = signals.to_context();
        delta.set("context", &context);
        state.context = Some(context);

        let Some(preview) = &signals.proposed_plan else {
            return;
        };

        match preview.clone().into_plan() {
            Ok(plan) => {
                debug!(tasks = plan.task_count(), "sync_context: promoting plan preview");
                delta.set("proposedPlan", &plan);
                state.proposed_plan = Some(plan);
            }
            Err(e) => {
                debug!(error = %e, "sync_context: preview incomplete, kept in context only");
            }
        }

        match preview.iteration {
            Some(iteration) if iteration >= state.iteration => {
                if iteration != state.iteration {
                    debug!(from = state.iteration, to = iteration, "sync_context: adopting preview iteration");
                    state.iteration = iteration;
                    delta.set("iteration", &iteration);
                }
            }
            Some(iteration) => {
                debug!(
                    preview = iteration,
                    current = state.iteration,
                    "sync_context: ignoring stale preview iteration"
                );
            }
            None => {}
        }
    }

    async fn ask(&self, message: &str, state: &SessionState) -> Result<RoutingDecision, FallbackReason> {
        let has_plan = state.has_plan();
        let state_json = serde_json::to_string_pretty(&state.snapshot()).unwrap_or_else(|_| "{}".to_string());
        let prompt = self
            .prompts
            .render(
                "approval",
                &ApprovalPrompt {
                    message: message.to_string(),
                    state_json,
                    has_plan,
                },
            )
            .map_err(|e| FallbackReason::Oracle(OracleError::InvocationFailed(format!("prompt: {}", e))))?;

        let answer = self.oracle.ask(&prompt).await?;
        parse_routing_decision(&answer, has_plan)
    }
}

#[async_trait]
impl Stage for ApprovalStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, state: &SessionState, input: &TurnInput) -> Result<StageOutcome, WorkflowError> {
        debug!(message_len = input.message.len(), "ApprovalStage::run: called");
        let mut next = state.clone();
        let mut delta = StateDelta::new();

        next.user_goal_text = Some(input.message.clone());
        self.sync_context(&mut next, input, &mut delta);

        let decision = match self.ask(&input.message, &next).await {
            Ok(decision) => decision,
            Err(reason) => {
                reason.log(Self::NAME);
                if self.strict {
                    return Err(reason.into_error(Self::NAME));
                }
                heuristic_decision(&input.message, next.has_plan())
            }
        };
        info!(
            routing = %decision.routing,
            consent = decision.detected_consent,
            reason = %decision.reason,
            "Approval decided"
        );

        next.routing = Some(decision.routing);
        next.detected_consent = decision.detected_consent;
        next.approval_reason = Some(decision.reason.clone());
        next.approval_decision = Some(decision.clone());

        delta.set("routing", &decision.routing);
        delta.set("detectedConsent", &decision.detected_consent);
        delta.set("approvalDecision", &decision);
        delta.set("approvalReason", &decision.reason);
        delta.set("userGoalText", &input.message);

        let summary = serde_json::to_string(&decision).unwrap_or_default();
        Ok(StageOutcome {
            state: next,
            summary,
            delta,
        })
    }
}
