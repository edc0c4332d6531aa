//! Finalization stage: reply, backend action and next state
//!
//! The oracle's answer is accepted only if every check passes; otherwise the
//! rule-based response replaces it wholesale. Legal combinations:
//!
//! | routing         | plan | action          | iteration | step             | active |
//! |-----------------|------|-----------------|-----------|------------------|--------|
//! | `finalize_only` | yes  | `finalize_goal` | unchanged | `finalized`      | false  |
//! | otherwise       | any  | `save_preview`  | +1        | by new iteration | true   |
//! | otherwise       | no   | `none`          | unchanged | by iteration     | false  |

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::{FallbackReason, Stage, StageOutcome};
use crate::domain::{
    ActionEnvelope, ActionType, FinalResponse, FinalState, Plan, Routing, SessionState, StateDelta, Step,
};
use crate::oracle::{Oracle, OracleError};
use crate::prompts::{FinalizePrompt, PromptLoader};
use crate::workflow::{TurnInput, WorkflowError};

/// Validate an oracle answer against the state machine
///
/// Returns the accepted response with its payload enriched, or the reason it
/// was rejected. Nothing in the answer is repaired.
///
/// `state.sessionActive` and `state.step` override the computed values, but an
/// integer `state.iteration` must equal the computed one: the counter only
/// ever moves by one per saved preview, so a differing claim is rejected
/// rather than applied.
pub fn normalize_response(
    answer: &Map<String, Value>,
    routing: Routing,
    plan: Option<&Plan>,
    iteration: u32,
) -> Result<FinalResponse, FallbackReason> {
    debug!(%routing, has_plan = plan.is_some(), iteration, "normalize_response: called");

    // Shape
    let reply = answer
        .get("reply")
        .and_then(Value::as_str)
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| FallbackReason::Invalid("reply must be a non-empty string".to_string()))?;
    let action = answer
        .get("action")
        .and_then(Value::as_object)
        .ok_or_else(|| FallbackReason::Invalid("action must be an object".to_string()))?;
    let state = answer
        .get("state")
        .and_then(Value::as_object)
        .ok_or_else(|| FallbackReason::Invalid("state must be an object".to_string()))?;

    let type_str = action
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| FallbackReason::Invalid("action.type must be a string".to_string()))?;
    let payload = match action.get("payload") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(payload)) => payload.clone(),
        Some(_) => return Err(FallbackReason::Invalid("action.payload must be an object".to_string())),
    };

    // Legality
    let action_type = ActionType::parse(type_str)
        .ok_or_else(|| FallbackReason::Illegal(format!("unknown action type '{}'", type_str)))?;
    let expected = expected_state(action_type, routing, plan.is_some(), iteration)?;

    // Overrides, each only when well-typed
    let mut final_state = expected;
    if let Some(claimed) = state.get("iteration").and_then(Value::as_u64) {
        if claimed != u64::from(final_state.iteration) {
            return Err(FallbackReason::Illegal(format!(
                "state.iteration {} contradicts expected {}",
                claimed, final_state.iteration
            )));
        }
    }
    if let Some(active) = state.get("sessionActive").and_then(Value::as_bool) {
        final_state.session_active = active;
    }
    if let Some(step) = state.get("step").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        final_state.step = Step::from(step);
    }

    let payload = enrich_payload(action_type, payload, plan, final_state.iteration);
    Ok(FinalResponse {
        reply: reply.to_string(),
        action: ActionEnvelope::new(action_type, payload),
        state: final_state,
    })
}

/// The state a legal action leads to, or why the action is illegal
fn expected_state(
    action_type: ActionType,
    routing: Routing,
    has_plan: bool,
    iteration: u32,
) -> Result<FinalState, FallbackReason> {
    match (routing, has_plan, action_type) {
        (Routing::FinalizeOnly, true, ActionType::FinalizeGoal) => Ok(FinalState {
            iteration,
            session_active: false,
            step: Step::Finalized,
        }),
        (Routing::FinalizeOnly, true, other) => Err(FallbackReason::Illegal(format!(
            "approved plan must be finalized, got '{}'",
            other
        ))),
        (_, _, ActionType::FinalizeGoal) => Err(FallbackReason::Illegal(
            "finalize_goal requires finalize_only routing and a plan".to_string(),
        )),
        (_, true, ActionType::NoOp) => Err(FallbackReason::Illegal("'none' with a plan to save".to_string())),
        (_, false, ActionType::NoOp) => Ok(FinalState {
            iteration,
            session_active: false,
            step: Step::for_iteration(iteration),
        }),
        (_, _, ActionType::SavePreview) => {
            let next = next_iteration(iteration)?;
            Ok(FinalState {
                iteration: next,
                session_active: true,
                step: Step::for_iteration(next),
            })
        }
    }
}

/// Add the plan data the backend needs to persist the action
///
/// Plan-derived keys always reflect the committed plan and final iteration;
/// any other keys the oracle supplied are kept.
pub fn enrich_payload(
    action_type: ActionType,
    mut payload: Map<String, Value>,
    plan: Option<&Plan>,
    iteration: u32,
) -> Map<String, Value> {
    debug!(%action_type, iteration, "enrich_payload: called");
    match action_type {
        ActionType::FinalizeGoal => {
            let (id, goal, milestones) = match plan {
                Some(plan) => (
                    plan.id.clone().map(Value::String).unwrap_or(Value::Null),
                    serde_json::to_value(&plan.goal).unwrap_or(Value::Null),
                    serde_json::to_value(&plan.milestones).unwrap_or(Value::Null),
                ),
                None => (Value::Null, Value::Object(Map::new()), Value::Array(vec![])),
            };
            payload.insert("goalPreviewId".to_string(), id);
            payload.insert("goal".to_string(), goal);
            payload.insert("milestones".to_string(), milestones);
        }
        ActionType::SavePreview => {
            let preview = plan.and_then(|p| serde_json::to_value(p).ok()).unwrap_or(Value::Null);
            payload.insert("goalPreview".to_string(), preview);
            payload.insert("iteration".to_string(), Value::from(iteration));
        }
        ActionType::NoOp => {}
    }
    payload
}

/// Iteration after a saved preview; the counter never wraps or sticks
fn next_iteration(iteration: u32) -> Result<u32, FallbackReason> {
    iteration
        .checked_add(1)
        .ok_or_else(|| FallbackReason::Illegal(format!("iteration {} cannot be advanced", iteration)))
}

/// The rule-based response used whenever the oracle's answer is rejected
///
/// Fails only when a preview would have to be saved past the last iteration.
pub fn fallback_response(
    routing: Routing,
    plan: Option<&Plan>,
    iteration: u32,
) -> Result<FinalResponse, FallbackReason> {
    debug!(%routing, has_plan = plan.is_some(), iteration, "fallback_response: called");
    match (routing, plan) {
        (Routing::FinalizeOnly, Some(plan)) => Ok(FinalResponse {
            reply: format!("I've created a goal for you: {} 🎯", plan.goal.title),
            action: ActionEnvelope::new(
                ActionType::FinalizeGoal,
                enrich_payload(ActionType::FinalizeGoal, Map::new(), Some(plan), iteration),
            ),
            state: FinalState {
                iteration,
                session_active: false,
                step: Step::Finalized,
            },
        }),
        _ => {
            let next = next_iteration(iteration)?;
            let reply = if next == 1 {
                "Here's a plan based on your message!"
            } else {
                "I've updated your plan as requested."
            };
            Ok(FinalResponse {
                reply: reply.to_string(),
                action: ActionEnvelope::new(
                    ActionType::SavePreview,
                    enrich_payload(ActionType::SavePreview, Map::new(), plan, next),
                ),
                state: FinalState {
                    iteration: next,
                    session_active: true,
                    step: Step::for_iteration(next),
                },
            })
        }
    }
}

/// Turns routing and plan into the turn's final response
pub struct FinalizeStage {
    oracle: Arc<dyn Oracle>,
    prompts: Arc<PromptLoader>,
    strict: bool,
}

impl FinalizeStage {
    pub const NAME: &'static str = "finalize";

    pub fn new(oracle: Arc<dyn Oracle>, prompts: Arc<PromptLoader>, strict: bool) -> Self {
        Self { oracle, prompts, strict }
    }

    async fn ask(&self, state: &SessionState) -> Result<FinalResponse, FallbackReason> {
        let routing = state.routing();
        let plan = state.proposed_plan.as_ref();
        let state_json = serde_json::to_string_pretty(&state.snapshot()).unwrap_or_else(|_| "{}".to_string());
        let plan_json = plan
            .and_then(|p| serde_json::to_string_pretty(p).ok())
            .unwrap_or_else(|| "{}".to_string());

        let prompt = self
            .prompts
            .render(
                "finalize",
                &FinalizePrompt {
                    routing: routing.to_string(),
                    iteration: state.iteration,
                    state_json,
                    plan_json,
                },
            )
            .map_err(|e| FallbackReason::Oracle(OracleError::InvocationFailed(format!("prompt: {}", e))))?;

        let answer = self.oracle.ask(&prompt).await?;
        normalize_response(&answer, routing, plan, state.iteration)
    }
}

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn run(&self, state: &SessionState, _input: &TurnInput) -> Result<StageOutcome, WorkflowError> {
        debug!(routing = %state.routing(), iteration = state.iteration, "FinalizeStage::run: called");
        let mut next = state.clone();
        let mut delta = StateDelta::new();

        if next.routing() == Routing::FinalizeOnly && !next.has_plan() {
            debug!("FinalizeStage::run: finalize_only without plan, coercing to needs_planning");
            next.routing = Some(Routing::NeedsPlanning);
            delta.set("routing", &Routing::NeedsPlanning);
        }

        let response = match self.ask(&next).await {
            Ok(response) => response,
            Err(reason) => {
                reason.log(Self::NAME);
                if self.strict {
                    return Err(reason.into_error(Self::NAME));
                }
                fallback_response(next.routing(), next.proposed_plan.as_ref(), next.iteration)
                    .map_err(|reason| reason.into_error(Self::NAME))?
            }
        };
        info!(
            action = %response.action.action_type,
            iteration = response.state.iteration,
            step = %response.state.step,
            session_active = response.state.session_active,
            "Turn finalized"
        );

        next.iteration = response.state.iteration;
        next.session_active = response.state.session_active;
        next.step = Some(response.state.step.clone());
        next.last_action = Some(response.action.clone());
        next.final_response = Some(response.clone());
        next.user_goal_text = None;

        delta.set("iteration", &response.state.iteration);
        delta.set("sessionActive", &response.state.session_active);
        delta.set("step", &response.state.step);
        delta.set("lastAction", &response.action);
        delta.set("finalResponse", &response);
        delta.clear("userGoalText");

        let summary = serde_json::to_string(&response).unwrap_or_default();
        Ok(StageOutcome {
            state: next,
            summary,
            delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Goal, Milestone, Task};
    use crate::stages::testing::ScriptedOracle;
    use proptest::prelude::*;
    use serde_json::json;

    fn sample_plan() -> Plan {
        Plan {
            id: Some("gp-3".to_string()),
            summary: None,
            goal: Goal::titled("Learn piano"),
            milestones: vec![Milestone {
                title: "Basics".to_string(),
                description: None,
                tasks: vec![Task::titled("Scales")],
            }],
        }
    }

    fn obj(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn stage(oracle: ScriptedOracle, strict: bool) -> FinalizeStage {
        FinalizeStage::new(Arc::new(oracle), Arc::new(PromptLoader::embedded_only()), strict)
    }

    #[test]
    fn test_accepts_legal_finalize() {
        let plan = sample_plan();
        let response = normalize_response(
            &obj(json!({
                "reply": "Done!",
                "action": { "type": "finalize_goal", "payload": { "note": "kept" } },
                "state": { "iteration": 2, "sessionActive": false, "step": "finalized" }
            })),
            Routing::FinalizeOnly,
            Some(&plan),
            2,
        )
        .unwrap();

        assert_eq!(response.reply, "Done!");
        assert_eq!(response.action.action_type, ActionType::FinalizeGoal);
        assert_eq!(response.action.payload["note"], "kept");
        assert_eq!(response.action.payload["goalPreviewId"], "gp-3");
        assert_eq!(response.action.payload["goal"]["title"], "Learn piano");
        assert_eq!(response.state.iteration, 2);
        assert_eq!(response.state.step, Step::Finalized);
        assert!(!response.state.session_active);
    }

    #[test]
    fn test_accepts_save_preview_with_computed_state() {
        let plan = sample_plan();
        let response = normalize_response(
            &obj(json!({
                "reply": "Here you go",
                "action": { "type": "save_preview" },
                "state": {}
            })),
            Routing::NeedsPlanning,
            Some(&plan),
            0,
        )
        .unwrap();

        assert_eq!(response.state.iteration, 1);
        assert_eq!(response.state.step, Step::PlanGenerated);
        assert!(response.state.session_active);
        assert_eq!(response.action.payload["iteration"], 1);
        assert_eq!(response.action.payload["goalPreview"]["goal"]["title"], "Learn piano");
    }

    #[test]
    fn test_well_typed_overrides_apply() {
        let plan = sample_plan();
        let response = normalize_response(
            &obj(json!({
                "reply": "Saved",
                "action": { "type": "save_preview", "payload": {} },
                "state": { "iteration": 4, "sessionActive": false, "step": "awaiting_review" }
            })),
            Routing::NeedsPlanning,
            Some(&plan),
            3,
        )
        .unwrap();

        assert_eq!(response.state.iteration, 4);
        assert!(!response.state.session_active);
        assert_eq!(response.state.step, Step::Other("awaiting_review".to_string()));
    }

    #[test]
    fn test_ill_typed_overrides_are_ignored() {
        let plan = sample_plan();
        let response = normalize_response(
            &obj(json!({
                "reply": "Saved",
                "action": { "type": "save_preview" },
                "state": { "iteration": "four", "sessionActive": "yes", "step": 3 }
            })),
            Routing::NeedsPlanning,
            Some(&plan),
            3,
        )
        .unwrap();

        assert_eq!(response.state.iteration, 4);
        assert!(response.state.session_active);
        assert_eq!(response.state.step, Step::PlanIteration);
    }

    #[test]
    fn test_rejects_contradicting_iteration() {
        let plan = sample_plan();
        let result = normalize_response(
            &obj(json!({
                "reply": "Saved",
                "action": { "type": "save_preview" },
                "state": { "iteration": 9 }
            })),
            Routing::NeedsPlanning,
            Some(&plan),
            3,
        );
        assert!(matches!(result, Err(FallbackReason::Illegal(_))));
    }

    #[test]
    fn test_rejects_bad_shapes() {
        let plan = sample_plan();
        for answer in [
            json!({ "action": { "type": "save_preview" }, "state": {} }),
            json!({ "reply": "  ", "action": { "type": "save_preview" }, "state": {} }),
            json!({ "reply": "ok", "action": "save_preview", "state": {} }),
            json!({ "reply": "ok", "action": { "type": "save_preview" } }),
            json!({ "reply": "ok", "action": { "payload": {} }, "state": {} }),
            json!({ "reply": "ok", "action": { "type": "save_preview", "payload": [] }, "state": {} }),
        ] {
            let result = normalize_response(&obj(answer.clone()), Routing::NeedsPlanning, Some(&plan), 1);
            assert!(matches!(result, Err(FallbackReason::Invalid(_))), "{} should be invalid", answer);
        }
    }

    #[test]
    fn test_rejects_illegal_actions() {
        let plan = sample_plan();
        let cases = [
            ("save_preview", Routing::FinalizeOnly, Some(&plan)),
            ("none", Routing::FinalizeOnly, Some(&plan)),
            ("finalize_goal", Routing::NeedsPlanning, Some(&plan)),
            ("finalize_goal", Routing::NeedsPlanning, None),
            ("none", Routing::NeedsPlanning, Some(&plan)),
            ("delete_goal", Routing::NeedsPlanning, Some(&plan)),
        ];
        for (action, routing, plan) in cases {
            let answer = obj(json!({ "reply": "ok", "action": { "type": action }, "state": {} }));
            let result = normalize_response(&answer, routing, plan, 1);
            assert!(
                matches!(result, Err(FallbackReason::Illegal(_))),
                "{} under {} should be illegal",
                action,
                routing
            );
        }
    }

    #[test]
    fn test_none_without_plan() {
        let response = normalize_response(
            &obj(json!({ "reply": "Tell me more", "action": { "type": "none" }, "state": {} })),
            Routing::NeedsPlanning,
            None,
            2,
        )
        .unwrap();

        assert_eq!(response.action.action_type, ActionType::NoOp);
        assert!(response.action.payload.is_empty());
        assert_eq!(response.state.iteration, 2);
        assert!(!response.state.session_active);
        assert_eq!(response.state.step, Step::PlanIteration);
    }

    #[test]
    fn test_payload_plan_keys_are_authoritative() {
        let plan = sample_plan();
        let response = normalize_response(
            &obj(json!({
                "reply": "Saved",
                "action": { "type": "save_preview", "payload": { "iteration": 99, "goalPreview": "junk" } },
                "state": {}
            })),
            Routing::NeedsPlanning,
            Some(&plan),
            1,
        )
        .unwrap();

        assert_eq!(response.action.payload["iteration"], 2);
        assert_eq!(response.action.payload["goalPreview"]["id"], "gp-3");
    }

    #[test]
    fn test_fallback_finalize() {
        let plan = sample_plan();
        let response = fallback_response(Routing::FinalizeOnly, Some(&plan), 2).unwrap();

        assert_eq!(response.reply, "I've created a goal for you: Learn piano 🎯");
        assert_eq!(response.action.action_type, ActionType::FinalizeGoal);
        assert_eq!(response.action.payload["goalPreviewId"], "gp-3");
        assert_eq!(response.action.payload["milestones"][0]["title"], "Basics");
        assert_eq!(
            response.state,
            FinalState {
                iteration: 2,
                session_active: false,
                step: Step::Finalized
            }
        );
    }

    #[test]
    fn test_fallback_first_save() {
        let plan = sample_plan();
        let response = fallback_response(Routing::NeedsPlanning, Some(&plan), 0).unwrap();

        assert_eq!(response.reply, "Here's a plan based on your message!");
        assert_eq!(response.action.action_type, ActionType::SavePreview);
        assert_eq!(response.action.payload["iteration"], 1);
        assert_eq!(response.state.step, Step::PlanGenerated);
        assert!(response.state.session_active);
    }

    #[test]
    fn test_fallback_later_save() {
        let plan = sample_plan();
        let response = fallback_response(Routing::NeedsPlanning, Some(&plan), 1).unwrap();

        assert_eq!(response.reply, "I've updated your plan as requested.");
        assert_eq!(response.state.iteration, 2);
        assert_eq!(response.state.step, Step::PlanIteration);
    }

    #[test]
    fn test_save_at_last_iteration_is_illegal() {
        let plan = sample_plan();
        let answer = obj(json!({
            "reply": "Saved",
            "action": { "type": "save_preview" },
            "state": {}
        }));

        assert!(matches!(
            normalize_response(&answer, Routing::NeedsPlanning, Some(&plan), u32::MAX),
            Err(FallbackReason::Illegal(_))
        ));
        assert!(matches!(
            fallback_response(Routing::NeedsPlanning, Some(&plan), u32::MAX),
            Err(FallbackReason::Illegal(_))
        ));

        // Finalizing does not advance the counter
        let response = fallback_response(Routing::FinalizeOnly, Some(&plan), u32::MAX).unwrap();
        assert_eq!(response.state.iteration, u32::MAX);
    }

    #[tokio::test]
    async fn test_run_fails_when_iteration_cannot_advance() {
        let stage = stage(ScriptedOracle::new(vec![]), false);
        let state = SessionState {
            routing: Some(Routing::NeedsPlanning),
            proposed_plan: Some(sample_plan()),
            iteration: u32::MAX,
            ..Default::default()
        };

        let err = stage.run(&state, &TurnInput::default()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateInvariantViolation { ref stage, .. } if stage == "finalize"));
    }

    #[tokio::test]
    async fn test_run_applies_oracle_response() {
        let oracle = ScriptedOracle::answering(json!({
            "reply": "Your goal is live!",
            "action": { "type": "finalize_goal" },
            "state": { "iteration": 2, "sessionActive": false, "step": "finalized" }
        }));
        let stage = stage(oracle, true);
        let state = SessionState {
            routing: Some(Routing::FinalizeOnly),
            proposed_plan: Some(sample_plan()),
            iteration: 2,
            user_goal_text: Some("yes".to_string()),
            ..Default::default()
        };

        let outcome = stage.run(&state, &TurnInput::default()).await.unwrap();
        assert_eq!(outcome.state.iteration, 2);
        assert_eq!(outcome.state.step, Some(Step::Finalized));
        assert!(!outcome.state.session_active);
        assert!(outcome.state.user_goal_text.is_none());
        assert_eq!(outcome.state.last_action.as_ref().unwrap().action_type, ActionType::FinalizeGoal);
        assert_eq!(outcome.state.final_response.as_ref().unwrap().reply, "Your goal is live!");
        assert_eq!(outcome.delta.get("userGoalText"), Some(&Value::Null));
        assert_eq!(outcome.delta.get("step"), Some(&json!("finalized")));
    }

    #[tokio::test]
    async fn test_run_falls_back_on_illegal_answer() {
        let oracle = ScriptedOracle::answering(json!({
            "reply": "Nothing to do",
            "action": { "type": "none" },
            "state": {}
        }));
        let stage = stage(oracle, false);
        let state = SessionState {
            routing: Some(Routing::NeedsPlanning),
            proposed_plan: Some(sample_plan()),
            iteration: 1,
            ..Default::default()
        };

        let outcome = stage.run(&state, &TurnInput::default()).await.unwrap();
        let response = outcome.state.final_response.unwrap();
        assert_eq!(response.action.action_type, ActionType::SavePreview);
        assert_eq!(response.reply, "I've updated your plan as requested.");
        assert_eq!(outcome.state.iteration, 2);
    }

    #[tokio::test]
    async fn test_run_strict_rejects_illegal_answer() {
        let oracle = ScriptedOracle::answering(json!({
            "reply": "Finalized",
            "action": { "type": "finalize_goal" },
            "state": {}
        }));
        let stage = stage(oracle, true);
        let state = SessionState {
            routing: Some(Routing::NeedsPlanning),
            proposed_plan: Some(sample_plan()),
            ..Default::default()
        };

        let err = stage.run(&state, &TurnInput::default()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StateInvariantViolation { ref stage, .. } if stage == "finalize"));
    }

    #[tokio::test]
    async fn test_run_coerces_finalize_without_plan() {
        let stage = stage(ScriptedOracle::new(vec![]), false);
        let state = SessionState {
            routing: Some(Routing::FinalizeOnly),
            ..Default::default()
        };

        let outcome = stage.run(&state, &TurnInput::default()).await.unwrap();
        assert_eq!(outcome.state.routing, Some(Routing::NeedsPlanning));
        assert_eq!(outcome.delta.get("routing"), Some(&json!("needs_planning")));
        let response = outcome.state.final_response.unwrap();
        assert_eq!(response.action.action_type, ActionType::SavePreview);
        assert_eq!(response.action.payload["goalPreview"], Value::Null);
    }

    #[tokio::test]
    async fn test_run_prompt_mentions_routing() {
        let oracle = Arc::new(ScriptedOracle::new(vec![]));
        let stage = FinalizeStage::new(oracle.clone(), Arc::new(PromptLoader::embedded_only()), false);
        let state = SessionState {
            routing: Some(Routing::FinalizeOnly),
            proposed_plan: Some(sample_plan()),
            iteration: 5,
            ..Default::default()
        };

        stage.run(&state, &TurnInput::default()).await.unwrap();
        let prompts = oracle.prompts();
        assert!(prompts[0].contains("Current routing: finalize_only"));
        assert!(prompts[0].contains("Current iteration: 5"));
        assert!(prompts[0].contains("\"title\": \"Learn piano\""));
    }

    fn arb_answer() -> impl Strategy<Value = Value> {
        let action = prop_oneof![
            Just(json!("save_preview")),
            Just(json!("finalize_goal")),
            Just(json!("none")),
            Just(json!("archive")),
            Just(json!(7)),
        ];
        let iteration = prop_oneof![Just(Value::Null), (0u64..6).prop_map(Value::from), Just(json!("2"))];
        let active = prop_oneof![Just(Value::Null), any::<bool>().prop_map(Value::Bool)];
        (action, iteration, active).prop_map(|(action, iteration, active)| {
            let mut state = Map::new();
            if !iteration.is_null() {
                state.insert("iteration".to_string(), iteration);
            }
            if !active.is_null() {
                state.insert("sessionActive".to_string(), active);
            }
            json!({ "reply": "ok", "action": { "type": action }, "state": state })
        })
    }

    proptest! {
        #[test]
        fn prop_accepted_responses_respect_the_state_machine(
            answer in arb_answer(),
            finalize in any::<bool>(),
            has_plan in any::<bool>(),
            iteration in 0u32..5,
        ) {
            let plan = sample_plan();
            let plan = if has_plan { Some(&plan) } else { None };
            let routing = if finalize { Routing::FinalizeOnly } else { Routing::NeedsPlanning };

            let response = match normalize_response(&obj(answer), routing, plan, iteration) {
                Ok(response) => response,
                Err(_) => fallback_response(routing, plan, iteration).unwrap(),
            };

            let delta = response.state.iteration - iteration;
            prop_assert!(delta <= 1);
            prop_assert_eq!(delta == 1, response.action.action_type == ActionType::SavePreview);
            if response.action.action_type == ActionType::FinalizeGoal {
                prop_assert!(finalize && has_plan);
            }
            if response.action.action_type == ActionType::NoOp {
                prop_assert!(!has_plan);
            }
        }
    }
}
