//! Interactive planning session
//!
//! Runs one workflow turn per line of input, carrying the session state
//! between turns the way a host backend would.

mod session;

pub use session::ChatSession;

use std::sync::Arc;

use eyre::Result;

use crate::workflow::Workflow;

/// Run the interactive session
///
/// This is the main entry point for `gp chat`.
pub async fn run_interactive(workflow: Arc<Workflow>) -> Result<()> {
    let mut session = ChatSession::new(workflow);
    session.run().await
}
