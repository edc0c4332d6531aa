//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the workflow stages.
//!
//! Template loading chain:
//! 1. `{prompts-dir}/{name}.pmt` (user override, from config)
//! 2. Embedded default compiled into the binary
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{ApprovalPrompt, FinalizePrompt, PlanPrompt, PromptLoader};
