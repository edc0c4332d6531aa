//! Domain types for goalplanner
//!
//! The plan tree the workflow builds and the session state it threads
//! through the three stages of a turn.

mod plan;
mod session;

pub use plan::{
    Goal, Milestone, PLACEHOLDER_MILESTONE, PLACEHOLDER_TASKS, Plan, PlanDraft, PlanError, Task, UNTITLED_GOAL,
};
pub use session::{
    ActionEnvelope, ActionType, FinalResponse, FinalState, Routing, RoutingDecision, SessionState, StateDelta, Step,
    TurnContext,
};
