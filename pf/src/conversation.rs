//! Conversation store
//!
//! Append-only message log partitioned by (project, agent). Ordering is the
//! store-assigned sequence number, never client time. Written messages are
//! never edited; the only removal is a whole-transcript delete on phase reset.

use tracing::debug;

use crate::domain::{AgentId, Message, Role};
use crate::state::{StateManager, StateResponse};

#[derive(Clone)]
pub struct ConversationStore {
    state: StateManager,
}

impl ConversationStore {
    pub fn new(state: StateManager) -> Self {
        Self { state }
    }

    /// Every message of a project, all agents, in sequence order
    pub async fn fetch(&self, project: &str) -> StateResponse<Vec<Message>> {
        debug!(%project, "ConversationStore::fetch: called");
        self.state.list_messages(project, None).await
    }

    pub async fn append(&self, project: &str, role: Role, content: &str, agent: AgentId) -> StateResponse<Message> {
        debug!(%project, %role, %agent, len = content.len(), "ConversationStore::append: called");
        self.state.append_message(project, agent, role, content).await
    }

    /// Remove one agent's transcript; returns how many messages went
    pub async fn delete_all(&self, project: &str, agent: AgentId) -> StateResponse<usize> {
        debug!(%project, %agent, "ConversationStore::delete_all: called");
        self.state.delete_messages(project, agent).await
    }

    /// One agent's transcript in sequence order
    pub async fn transcript(&self, project: &str, agent: AgentId) -> StateResponse<Vec<Message>> {
        debug!(%project, %agent, "ConversationStore::transcript: called");
        self.state.list_messages(project, Some(agent)).await
    }

    /// Persisted user and assistant messages for one agent
    pub async fn count(&self, project: &str, agent: AgentId) -> StateResponse<u64> {
        debug!(%project, %agent, "ConversationStore::count: called");
        self.state.count_messages(project, agent).await
    }
}
