//! goalplanner - Three-Stage Goal Planning Workflow
//!
//! goalplanner turns a user's free-text goal statement into a structured,
//! versioned plan and a backend action. Each turn runs three stages in order:
//! approval classifies intent, plan generates or refines the plan, and
//! finalization produces the reply, the action and the next session state.
//!
//! # Core Concepts
//!
//! - **Untrusted Oracle**: every LLM answer is validated and either accepted whole or replaced
//! - **Deterministic Fallbacks**: with no oracle at all, every turn still completes
//! - **Monotonic Iteration**: the counter moves by exactly one per saved preview
//! - **Strict Mode**: fallbacks become errors that abort the turn
//!
//! # Modules
//!
//! - [`domain`] - Plan tree and session state
//! - [`oracle`] - JSON oracle trait, live and unavailable implementations
//! - [`llm`] - LLM client trait with Anthropic and OpenAI implementations
//! - [`prompts`] - Prompt templates
//! - [`stages`] - Approval, plan and finalize stages
//! - [`workflow`] - Turn orchestrator
//! - [`adapter`] - Transport content to turn input
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface
//! - [`repl`] - Interactive chat session

pub mod adapter;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod oracle;
pub mod prompts;
pub mod repl;
pub mod stages;
pub mod workflow;

// Re-export commonly used types
pub use adapter::{Content, FunctionCall, Part};
pub use config::{Config, LlmConfig, WorkflowConfig};
pub use domain::{
    ActionEnvelope, ActionType, FinalResponse, FinalState, Goal, Milestone, Plan, PlanDraft, PlanError, Routing,
    RoutingDecision, SessionState, StateDelta, Step, Task, TurnContext,
};
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, OpenAIClient, create_client};
pub use oracle::{LlmOracle, Oracle, OracleError, UnavailableOracle, create_oracle};
pub use prompts::PromptLoader;
pub use stages::{ApprovalStage, FallbackReason, FinalizeStage, PlanStage, Stage, StageOutcome, heuristic_decision};
pub use workflow::{Signals, StageEvent, TurnAborted, TurnInput, TurnOutcome, Workflow, WorkflowError};
