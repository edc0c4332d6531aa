//! Session state and the values the workflow writes into it
//!
//! SessionState is persisted by the host between turns and owned by a single
//! turn while the workflow runs. Keys serialize in camelCase so the stored
//! snapshot matches what the backend and the oracle prompts see.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::plan::{Plan, PlanDraft};

/// Per-turn routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Routing {
    /// The user approved the current plan
    FinalizeOnly,
    /// The plan needs to be generated or refined
    #[default]
    NeedsPlanning,
}

impl Routing {
    /// Parse the wire form, rejecting anything else
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "finalize_only" => Some(Self::FinalizeOnly),
            "needs_planning" => Some(Self::NeedsPlanning),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FinalizeOnly => "finalize_only",
            Self::NeedsPlanning => "needs_planning",
        }
    }
}

impl std::fmt::Display for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Backend action kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Persist the plan as a preview and keep iterating
    SavePreview,
    /// Turn the plan into a real goal
    FinalizeGoal,
    /// Nothing to persist
    #[serde(rename = "none")]
    NoOp,
}

impl ActionType {
    /// Parse the wire form, rejecting anything else
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "save_preview" => Some(Self::SavePreview),
            "finalize_goal" => Some(Self::FinalizeGoal),
            "none" => Some(Self::NoOp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SavePreview => "save_preview",
            Self::FinalizeGoal => "finalize_goal",
            Self::NoOp => "none",
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Conversation step label
///
/// The oracle may supply its own label; unknown labels are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Step {
    PlanGenerated,
    PlanIteration,
    Finalized,
    Other(String),
}

impl Step {
    /// Step reached after saving the given iteration
    pub fn for_iteration(iteration: u32) -> Self {
        if iteration == 1 { Self::PlanGenerated } else { Self::PlanIteration }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::PlanGenerated => "plan_generated",
            Self::PlanIteration => "plan_iteration",
            Self::Finalized => "finalized",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Step {
    fn from(s: String) -> Self {
        match s.as_str() {
            "plan_generated" => Self::PlanGenerated,
            "plan_iteration" => Self::PlanIteration,
            "finalized" => Self::Finalized,
            _ => Self::Other(s),
        }
    }
}

impl From<&str> for Step {
    fn from(s: &str) -> Self {
        Self::from(s.to_string())
    }
}

impl From<Step> for String {
    fn from(step: Step) -> Self {
        step.as_str().to_string()
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of the approval stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub routing: Routing,
    pub detected_consent: bool,
    pub reason: String,
}

/// Action the backend should take after the turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEnvelope {
    #[serde(rename = "type")]
    pub action_type: ActionType,

    #[serde(default)]
    pub payload: Map<String, Value>,
}

impl ActionEnvelope {
    pub fn new(action_type: ActionType, payload: Map<String, Value>) -> Self {
        Self { action_type, payload }
    }
}

/// State fields produced by finalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalState {
    pub iteration: u32,
    pub session_active: bool,
    pub step: Step,
}

/// Reply, backend action and next state for one turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalResponse {
    pub reply: String,
    pub action: ActionEnvelope,
    pub state: FinalState,
}

/// Normalized context signals mirrored into session state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TurnContext {
    /// Plan preview supplied by the host, possibly incomplete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal_preview: Option<PlanDraft>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_hours_left: Option<f64>,

    /// Task-like records from the host calendar, passed through to prompts
    pub upcoming_tasks: Vec<Value>,
}

/// Session state carried across turns
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing: Option<Routing>,

    pub detected_consent: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_decision: Option<RoutingDecision>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,

    pub iteration: u32,

    pub session_active: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposed_plan: Option<Plan>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_action: Option<ActionEnvelope>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_response: Option<FinalResponse>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<TurnContext>,

    /// Scratch copy of the current message, cleared after finalization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_goal_text: Option<String>,
}

impl SessionState {
    /// Routing for this turn, defaulting to `needs_planning`
    pub fn routing(&self) -> Routing {
        self.routing.unwrap_or_default()
    }

    pub fn has_plan(&self) -> bool {
        self.proposed_plan.is_some()
    }

    /// JSON snapshot used in oracle prompts
    pub fn snapshot(&self) -> Value {
        debug!("SessionState::snapshot: called");
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Keys a stage changed, with their new values
///
/// A `null` value means the key was cleared.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateDelta(Map<String, Value>);

impl StateDelta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new value for `key`
    pub fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(v) => {
                self.0.insert(key.to_string(), v);
            }
            Err(e) => {
                debug!(%key, error = %e, "StateDelta::set: value not serializable");
            }
        }
    }

    /// Record that `key` was removed
    pub fn clear(&mut self, key: &str) {
        self.0.insert(key.to_string(), Value::Null);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_routing_parse() {
        assert_eq!(Routing::parse("finalize_only"), Some(Routing::FinalizeOnly));
        assert_eq!(Routing::parse("needs_planning"), Some(Routing::NeedsPlanning));
        assert_eq!(Routing::parse("FINALIZE_ONLY"), None);
        assert_eq!(Routing::parse(""), None);
        assert_eq!(Routing::default(), Routing::NeedsPlanning);
    }

    #[test]
    fn test_action_type_wire_names() {
        assert_eq!(serde_json::to_value(ActionType::NoOp).unwrap(), json!("none"));
        assert_eq!(serde_json::to_value(ActionType::SavePreview).unwrap(), json!("save_preview"));
        assert_eq!(ActionType::parse("finalize_goal"), Some(ActionType::FinalizeGoal));
        assert_eq!(ActionType::parse("delete_goal"), None);
    }

    #[test]
    fn test_step_round_trips_unknown_labels() {
        assert_eq!(Step::for_iteration(1), Step::PlanGenerated);
        assert_eq!(Step::for_iteration(0), Step::PlanIteration);
        assert_eq!(Step::for_iteration(4), Step::PlanIteration);

        let step: Step = serde_json::from_value(json!("awaiting_review")).unwrap();
        assert_eq!(step, Step::Other("awaiting_review".to_string()));
        assert_eq!(serde_json::to_value(&step).unwrap(), json!("awaiting_review"));

        let step: Step = serde_json::from_value(json!("finalized")).unwrap();
        assert_eq!(step, Step::Finalized);
    }

    #[test]
    fn test_session_state_defaults_from_empty_object() {
        let state: SessionState = serde_json::from_value(json!({})).unwrap();
        assert_eq!(state, SessionState::default());
        assert_eq!(state.routing(), Routing::NeedsPlanning);
        assert!(!state.has_plan());
    }

    #[test]
    fn test_session_state_camel_case_keys() {
        let state = SessionState {
            iteration: 2,
            session_active: true,
            step: Some(Step::PlanIteration),
            user_goal_text: Some("hello".to_string()),
            ..Default::default()
        };
        let value = state.snapshot();
        assert_eq!(value["iteration"], json!(2));
        assert_eq!(value["sessionActive"], json!(true));
        assert_eq!(value["step"], json!("plan_iteration"));
        assert_eq!(value["userGoalText"], json!("hello"));
        assert!(value.get("proposedPlan").is_none());
    }

    #[test]
    fn test_final_response_wire_shape() {
        let response = FinalResponse {
            reply: "done".to_string(),
            action: ActionEnvelope::new(ActionType::FinalizeGoal, Map::new()),
            state: FinalState {
                iteration: 2,
                session_active: false,
                step: Step::Finalized,
            },
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["action"]["type"], json!("finalize_goal"));
        assert_eq!(value["state"]["sessionActive"], json!(false));
        assert_eq!(value["state"]["step"], json!("finalized"));
    }

    #[test]
    fn test_state_delta_set_and_clear() {
        let mut delta = StateDelta::new();
        assert!(delta.is_empty());
        delta.set("routing", &Routing::FinalizeOnly);
        delta.clear("userGoalText");
        assert_eq!(delta.len(), 2);
        assert_eq!(delta.get("routing"), Some(&json!("finalize_only")));
        assert_eq!(delta.get("userGoalText"), Some(&Value::Null));
        assert!(delta.contains_key("routing"));
    }
}
