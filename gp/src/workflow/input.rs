//! Turn input: the user's message plus optional host signals

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{PlanDraft, TurnContext};

/// Everything the workflow consumes for one turn besides the previous state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnInput {
    /// Raw user message; may be empty
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signals: Option<Signals>,
}

impl TurnInput {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: Signals) -> Self {
        self.signals = Some(signals);
        self
    }
}

/// Optional context supplied by the host
///
/// Malformed individual signals are dropped rather than failing the turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Signals {
    /// Plan preview the host already holds, possibly incomplete
    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub proposed_plan: Option<PlanDraft>,

    #[serde(deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub available_hours_left: Option<f64>,

    #[serde(deserialize_with = "lenient_list")]
    pub upcoming_tasks: Vec<Value>,
}

impl Signals {
    pub fn is_empty(&self) -> bool {
        self.proposed_plan.is_none() && self.available_hours_left.is_none() && self.upcoming_tasks.is_empty()
    }

    /// Normalized copy mirrored into session state
    pub fn to_context(&self) -> TurnContext {
        TurnContext {
            goal_preview: self.proposed_plan.clone(),
            available_hours_left: self.available_hours_left,
            upcoming_tasks: self.upcoming_tasks.clone(),
        }
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match serde_json::from_value(v) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            debug!(error = %e, "lenient: dropping malformed signal");
            None
        }
    }))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    })
}
