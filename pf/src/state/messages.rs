//! State manager messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{AgentId, AnalysisRecord, Deliverable, Message, PhaseRecord, PhaseType, Role};

/// Errors from state operations
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Channel error")]
    ChannelError,
}

/// Response from state operations
pub type StateResponse<T> = Result<T, StateError>;

/// Commands sent to the StateManager actor
#[derive(Debug)]
pub enum StateCommand {
    // Message operations
    AppendMessage {
        project: String,
        agent: AgentId,
        role: Role,
        content: String,
        reply: oneshot::Sender<StateResponse<Message>>,
    },
    ListMessages {
        project: String,
        agent: Option<AgentId>,
        reply: oneshot::Sender<StateResponse<Vec<Message>>>,
    },
    CountMessages {
        project: String,
        agent: AgentId,
        reply: oneshot::Sender<StateResponse<u64>>,
    },
    DeleteMessages {
        project: String,
        agent: AgentId,
        reply: oneshot::Sender<StateResponse<usize>>,
    },

    // PhaseRecord operations
    UpsertPhaseRecord {
        project: String,
        phase_type: PhaseType,
        content: Deliverable,
        completed: bool,
        reply: oneshot::Sender<StateResponse<PhaseRecord>>,
    },
    GetPhaseRecord {
        project: String,
        phase_type: PhaseType,
        reply: oneshot::Sender<StateResponse<Option<PhaseRecord>>>,
    },
    ListPhaseRecords {
        project: String,
        reply: oneshot::Sender<StateResponse<Vec<PhaseRecord>>>,
    },

    // AnalysisRecord operations
    UpsertAnalysis {
        project: String,
        agent: AgentId,
        capability_id: String,
        content: String,
        completed: bool,
        reply: oneshot::Sender<StateResponse<AnalysisRecord>>,
    },
    ListAnalyses {
        project: String,
        agent: AgentId,
        reply: oneshot::Sender<StateResponse<Vec<AnalysisRecord>>>,
    },

    // Shutdown
    Shutdown,
}
