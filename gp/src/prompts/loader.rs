//! Prompt Loader
//!
//! Loads prompt templates from an override directory or falls back to
//! embedded defaults, then renders them with handlebars.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;

/// Context for the approval prompt
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalPrompt {
    pub message: String,
    /// Pretty-printed session state snapshot
    pub state_json: String,
    pub has_plan: bool,
}

/// Context for the plan prompt
#[derive(Debug, Clone, Serialize)]
pub struct PlanPrompt {
    pub message: String,
    /// Existing plan as JSON, or `null`
    pub existing_plan_json: String,
    pub has_existing_plan: bool,
    pub available_hours: Option<f64>,
    pub upcoming_tasks_json: String,
}

/// Context for the finalize prompt
#[derive(Debug, Clone, Serialize)]
pub struct FinalizePrompt {
    pub routing: String,
    pub iteration: u32,
    pub state_json: String,
    pub plan_json: String,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (`workflow.prompts-dir`)
    override_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a loader that checks `override_dir` before the embedded prompts
    ///
    /// A directory that does not exist is ignored.
    pub fn new(override_dir: Option<&Path>) -> Self {
        debug!(?override_dir, "PromptLoader::new: called");
        let override_dir = override_dir.filter(|dir| dir.is_dir()).map(Path::to_path_buf);
        if override_dir.is_none() {
            debug!("PromptLoader::new: no usable override directory");
        }

        Self {
            hbs: Self::engine(),
            override_dir,
        }
    }

    /// Create a loader that only uses embedded prompts
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            override_dir: None,
        }
    }

    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        // Prompts are plain text; HTML escaping would mangle the embedded JSON.
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `{override_dir}/{name}.pmt`
    /// 2. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        if let Some(ref dir) = self.override_dir {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found in override directory");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt override {}: {}", path.display(), e));
            }
            debug!(?path, "PromptLoader::load_template: not found in override directory");
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: using embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

impl Default for PromptLoader {
    fn default() -> Self {
        Self::embedded_only()
    }
}
