//! Session errors, events and snapshots

use thiserror::Error;

use crate::domain::{AgentId, Message};
use crate::llm::LlmError;
use crate::state::StateError;

/// Why a send did not produce a persisted reply
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("{agent} is still replying; wait for it to finish")]
    Busy { agent: AgentId },

    #[error("Your plan does not include the {agent} agent")]
    AgentLocked { agent: AgentId },

    #[error("Message quota exhausted for this plan")]
    QuotaExceeded,

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("The model returned an empty reply")]
    EmptyReply,

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StateError),

    #[error("Prompt error: {0}")]
    Prompt(String),
}

impl SessionError {
    /// Single user-facing notification for this failure
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Llm(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    pub fn is_quota(&self) -> bool {
        match self {
            SessionError::QuotaExceeded => true,
            SessionError::Llm(e) => e.is_quota(),
            _ => false,
        }
    }
}

/// Live notifications for UI adapters
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new piece of streamed text for `agent`
    Delta { agent: AgentId, text: String },

    /// The reply was persisted
    Completed { agent: AgentId, message: Message },

    /// The send failed; nothing beyond the user turn was persisted
    Failed { agent: AgentId, error: String },
}

/// Point-in-time view of the session for rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Current agent's transcript, including a live reply if one is streaming
    pub messages: Vec<Message>,
    pub all_messages: Vec<Message>,
    /// Whether the current agent has a send in flight
    pub is_processing: bool,
    pub is_loading: bool,
    pub current_agent: AgentId,
    pub last_error: Option<String>,
}
