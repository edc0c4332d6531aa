//! Events emitted after each stage

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::StateDelta;

/// One stage's contribution to the turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageEvent {
    pub stage_name: String,

    /// The stage's output as JSON text, or a skip notice
    pub text_summary: String,

    pub state_delta: StateDelta,

    pub emitted_at: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(stage_name: impl Into<String>, text_summary: impl Into<String>, state_delta: StateDelta) -> Self {
        Self {
            stage_name: stage_name.into(),
            text_summary: text_summary.into(),
            state_delta,
            emitted_at: Utc::now(),
        }
    }
}
