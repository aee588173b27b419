//! Capability trigger flow
//!
//! Sends the capability prompt as a normal user turn, strips the trailing
//! follow-up question from the reply and upserts the analysis as completed.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use super::followup::strip_follow_up;
use super::gate;
use crate::catalog::Catalog;
use crate::conversation::ConversationStore;
use crate::domain::{AgentId, AnalysisRecord};
use crate::session::{ChatSession, SessionError};
use crate::state::{StateError, StateManager};

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Agent {agent} has no capability named {id}")]
    Unknown { agent: AgentId, id: String },

    #[error("{id} unlocks after {needed} messages ({have} so far)")]
    NotEnoughMessages { id: String, needed: u32, have: u64 },

    #[error("{id} needs a completed {dependency} analysis first")]
    Blocked { id: String, dependency: String },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StateError),
}

pub struct CapabilityRunner {
    catalog: Arc<Catalog>,
    session: ChatSession,
    conversations: ConversationStore,
    state: StateManager,
}

impl CapabilityRunner {
    pub fn new(
        catalog: Arc<Catalog>,
        session: ChatSession,
        conversations: ConversationStore,
        state: StateManager,
    ) -> Self {
        Self {
            catalog,
            session,
            conversations,
            state,
        }
    }

    /// Run a capability for the session's project
    ///
    /// The analysis is only written after the reply has been persisted.
    pub async fn run(&self, agent: AgentId, capability_id: &str) -> Result<AnalysisRecord, CapabilityError> {
        let project = self.session.project().to_string();
        debug!(%project, %agent, %capability_id, "CapabilityRunner::run: called");

        let capability = self
            .catalog
            .capability(agent, capability_id)
            .ok_or_else(|| CapabilityError::Unknown {
                agent,
                id: capability_id.to_string(),
            })?;

        let count = self.conversations.count(&project, agent).await?;
        let analyses = self.state.list_analyses(&project, agent).await?;

        if let Some(dep) = gate::blocked_by(capability, &analyses) {
            return Err(CapabilityError::Blocked {
                id: capability.id.clone(),
                dependency: dep.to_string(),
            });
        }
        if !gate::is_unlocked(capability, count, &analyses) {
            return Err(CapabilityError::NotEnoughMessages {
                id: capability.id.clone(),
                needed: capability.min_messages,
                have: count,
            });
        }

        let reply = self.session.try_send(&capability.prompt, agent, false).await?;
        let cleaned = strip_follow_up(&reply);

        let record = self
            .state
            .upsert_analysis(&project, agent, &capability.id, cleaned, true)
            .await?;
        info!(%project, %agent, capability = %capability.id, "Analysis saved");
        Ok(record)
    }
}
