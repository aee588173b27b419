//! Interactive REPL for PhaseForge
//!
//! Streams agent replies as they arrive and exposes the workflow through
//! slash commands. UI-only state such as the introduction guard lives here.

mod command;
pub mod display;
mod intro;
mod session;

pub use command::SlashCommand;
pub use intro::IntroductionGuard;
pub use session::ReplSession;

use std::sync::Arc;

use eyre::Result;

use crate::domain::AgentId;
use crate::llm::LlmClient;
use crate::workflow::{Services, Workflow};

/// Run the interactive REPL
///
/// This is the main entry point for `pf chat`.
pub async fn run_interactive(services: &Services, project: &str, agent: AgentId, llm: Arc<dyn LlmClient>) -> Result<()> {
    let workflow = Workflow::new(services, project, llm);
    let mut session = ReplSession::new(workflow);
    session.run(agent).await
}
