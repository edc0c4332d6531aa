//! Transport adapter
//!
//! Hosts deliver a turn as chat content made of parts: free text, plus
//! function-call parts that carry context the host already knows. This module
//! turns that content into a [`TurnInput`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::domain::PlanDraft;
use crate::workflow::{Signals, TurnInput};

/// Function call carrying the host's current plan preview
pub const GOAL_PREVIEW_CALL: &str = "goal_preview_context";

/// Function call carrying the user's remaining weekly hours
pub const TIME_CALL: &str = "time_context";

/// Function call carrying upcoming scheduled tasks
pub const TASK_CALL: &str = "task_context";

/// Incoming chat content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Content {
    /// Direct message, preferred when non-empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    pub parts: Vec<Part>,
}

/// One piece of chat content
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(alias = "functionCall", skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            function_call: None,
        }
    }

    pub fn call(name: impl Into<String>, args: Value) -> Self {
        Self {
            text: None,
            function_call: Some(FunctionCall {
                name: name.into(),
                args,
            }),
        }
    }
}

/// A named call with JSON arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FunctionCall {
    pub name: String,
    pub args: Value,
}

impl Content {
    /// The user's message: `message`, then `text`, then the first text part
    ///
    /// Whitespace is trimmed; empty candidates are skipped.
    pub fn user_message(&self) -> String {
        debug!(parts = self.parts.len(), "Content::user_message: called");
        let direct = [self.message.as_deref(), self.text.as_deref()];
        direct
            .into_iter()
            .flatten()
            .chain(self.parts.iter().filter_map(|p| p.text.as_deref()))
            .map(str::trim)
            .find(|t| !t.is_empty())
            .unwrap_or_default()
            .to_string()
    }

    /// Arguments of the first function call with this name, if they are an object
    fn call_args(&self, name: &str) -> Option<&Map<String, Value>> {
        self.parts
            .iter()
            .filter_map(|p| p.function_call.as_ref())
            .filter(|call| call.name == name)
            .find_map(|call| call.args.as_object())
    }

    /// Context signals carried by function-call parts
    pub fn signals(&self) -> Signals {
        debug!("Content::signals: called");
        let proposed_plan = self
            .call_args(GOAL_PREVIEW_CALL)
            .and_then(|args| args.get("goalPreview"))
            .filter(|v| !v.is_null())
            .and_then(|v| match serde_json::from_value::<PlanDraft>(v.clone()) {
                Ok(draft) => Some(draft),
                Err(e) => {
                    debug!(error = %e, "Content::signals: dropping malformed goal preview");
                    None
                }
            });

        let available_hours_left = self
            .call_args(TIME_CALL)
            .and_then(|args| args.get("availableHoursLeft"))
            .and_then(Value::as_f64);

        let upcoming_tasks = self
            .call_args(TASK_CALL)
            .and_then(|args| args.get("upcomingTasks"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Signals {
            proposed_plan,
            available_hours_left,
            upcoming_tasks,
        }
    }

    /// Convert into workflow input; signals are omitted when all are empty
    pub fn into_turn_input(self) -> TurnInput {
        let message = self.user_message();
        let signals = self.signals();
        TurnInput {
            message,
            signals: if signals.is_empty() { None } else { Some(signals) },
        }
    }
}

impl From<Content> for TurnInput {
    fn from(content: Content) -> Self {
        content.into_turn_input()
    }
}
