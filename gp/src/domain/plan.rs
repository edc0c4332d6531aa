//! Plan domain types
//!
//! A Plan is the goal/milestone/task tree the workflow proposes and refines.
//! Committed plans are always structurally complete: a goal, at least one
//! milestone, and at least one task per milestone. Incomplete input (host
//! previews, oracle output) is held as a [`PlanDraft`] until it either passes
//! [`PlanDraft::into_plan`] or is completed by [`PlanDraft::complete_with`].

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Title used when neither the draft nor the message provides one
pub const UNTITLED_GOAL: &str = "Untitled Goal";

/// Title of the milestone synthesized by the fallback merge
pub const PLACEHOLDER_MILESTONE: &str = "Plan Milestone";

/// Tasks of the milestone synthesized by the fallback merge
pub const PLACEHOLDER_TASKS: [&str; 2] = ["Clarify objective", "Outline next steps"];

/// Reasons a candidate plan is rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("plan is not a valid plan object: {0}")]
    Malformed(String),

    #[error("plan has no goal")]
    MissingGoal,

    #[error("plan goal has an empty title")]
    EmptyGoalTitle,

    #[error("plan has no milestones")]
    NoMilestones,

    #[error("milestone {index} has no tasks")]
    EmptyMilestone { index: usize },
}

/// What the user is trying to achieve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_per_week: Option<f64>,
}

impl Goal {
    /// Create a goal with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            hours_per_week: None,
        }
    }
}

/// A concrete unit of work inside a milestone
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Scheduled date as supplied (ISO-8601 expected, not parsed)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
}

impl Task {
    /// Create a task with only a title
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            date: None,
            estimated_hours: None,
        }
    }
}

/// An ordered group of tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Milestone {
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Milestone {
    /// The single milestone used when nothing better is known
    pub fn placeholder() -> Self {
        Self {
            title: PLACEHOLDER_MILESTONE.to_string(),
            description: None,
            tasks: PLACEHOLDER_TASKS.iter().map(|t| Task::titled(*t)).collect(),
        }
    }
}

/// A structurally complete goal plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Identifier assigned by the backend, if the plan was persisted before
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    pub goal: Goal,

    pub milestones: Vec<Milestone>,
}

impl Plan {
    /// Parse an externally sourced value into a plan, or reject it
    ///
    /// Accepts the value fully or not at all; no field is repaired.
    pub fn from_value(value: &Value) -> Result<Self, PlanError> {
        debug!("Plan::from_value: called");
        let draft: PlanDraft =
            serde_json::from_value(value.clone()).map_err(|e| PlanError::Malformed(e.to_string()))?;
        draft.into_plan()
    }

    /// Check the structural invariant
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.goal.title.trim().is_empty() {
            return Err(PlanError::EmptyGoalTitle);
        }
        if self.milestones.is_empty() {
            return Err(PlanError::NoMilestones);
        }
        if let Some(index) = self.milestones.iter().position(|m| m.tasks.is_empty()) {
            return Err(PlanError::EmptyMilestone { index });
        }
        Ok(())
    }

    /// Total number of tasks across all milestones
    pub fn task_count(&self) -> usize {
        self.milestones.iter().map(|m| m.tasks.len()).sum()
    }

    /// Indented text outline of the plan
    pub fn outline(&self) -> String {
        let mut out = format!("{}\n", self.goal.title);
        if let Some(hours) = self.goal.hours_per_week {
            out.push_str(&format!("  ({} h/week)\n", hours));
        }
        for (i, milestone) in self.milestones.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, milestone.title));
            for task in &milestone.tasks {
                match &task.date {
                    Some(date) => out.push_str(&format!("     - {} [{}]\n", task.title, date)),
                    None => out.push_str(&format!("     - {}\n", task.title)),
                }
            }
        }
        out
    }
}

/// A possibly incomplete plan, as supplied by a host preview or the oracle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PlanDraft {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<Goal>,

    pub milestones: Vec<Milestone>,

    /// Iteration counter carried by host previews; non-integers are ignored
    #[serde(deserialize_with = "integer_or_none", skip_serializing_if = "Option::is_none")]
    pub iteration: Option<u32>,
}

impl PlanDraft {
    /// Promote the draft to a plan if it is structurally complete
    pub fn into_plan(self) -> Result<Plan, PlanError> {
        let goal = self.goal.ok_or(PlanError::MissingGoal)?;
        let plan = Plan {
            id: self.id,
            summary: self.summary,
            goal,
            milestones: self.milestones,
        };
        plan.validate()?;
        Ok(plan)
    }

    /// Deterministically complete the draft into a valid plan
    ///
    /// Keeps every usable part of the draft. A missing or blank goal is
    /// replaced by one titled from `message`; milestones without tasks are
    /// dropped, and if none remain a single placeholder milestone is added.
    pub fn complete_with(self, message: &str) -> Plan {
        debug!(has_goal = self.goal.is_some(), milestones = self.milestones.len(), "PlanDraft::complete_with: called");
        let goal = match self.goal {
            Some(goal) if !goal.title.trim().is_empty() => goal,
            _ => {
                let title = message.trim();
                debug!(%title, "PlanDraft::complete_with: synthesizing goal");
                Goal::titled(if title.is_empty() { UNTITLED_GOAL } else { title })
            }
        };

        let mut milestones: Vec<Milestone> = self.milestones.into_iter().filter(|m| !m.tasks.is_empty()).collect();
        if milestones.is_empty() {
            debug!("PlanDraft::complete_with: synthesizing placeholder milestone");
            milestones.push(Milestone::placeholder());
        }

        Plan {
            id: self.id,
            summary: self.summary,
            goal,
            milestones,
        }
    }
}

impl From<Plan> for PlanDraft {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            summary: plan.summary,
            goal: Some(plan.goal),
            milestones: plan.milestones,
            iteration: None,
        }
    }
}

fn integer_or_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| v.as_u64()).and_then(|n| u32::try_from(n).ok()))
}
