//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Approval classification prompt
pub const APPROVAL: &str = include_str!("../../prompts/approval.pmt");

/// Plan generation and refinement prompt
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Reply/action/state finalization prompt
pub const FINALIZE: &str = include_str!("../../prompts/finalize.pmt");

/// Names of every embedded template
pub const NAMES: [&str; 3] = ["approval", "plan", "finalize"];

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "approval" => Some(APPROVAL),
        "plan" => Some(PLAN),
        "finalize" => Some(FINALIZE),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_approval() {
        let approval = get_embedded("approval").unwrap();
        assert!(approval.contains("finalize_only"));
        assert!(approval.contains("needs_planning"));
        assert!(approval.contains("detectedConsent"));
        assert!(approval.contains("{{message}}"));
    }

    #[test]
    fn test_get_embedded_plan() {
        let plan = get_embedded("plan").unwrap();
        assert!(plan.contains("milestones"));
        assert!(plan.contains("{{existing_plan_json}}"));
    }

    #[test]
    fn test_get_embedded_finalize() {
        let finalize = get_embedded("finalize").unwrap();
        assert!(finalize.contains("save_preview"));
        assert!(finalize.contains("finalize_goal"));
        assert!(finalize.contains("plan_iteration"));
    }

    #[test]
    fn test_all_names_resolve() {
        for name in NAMES {
            assert!(get_embedded(name).is_some(), "{} should be embedded", name);
        }
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
