//! StateManager - actor that owns the PhaseStore
//!
//! Processes commands via channels so every write from this process is
//! serialized and a reply is only sent once the write has committed.

use std::path::Path;

use phasestore::{NewMessage, StoredAnalysis, StoredMessage, StoredPhaseRecord, Store};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::messages::{StateCommand, StateError, StateResponse};
use crate::domain::{AgentId, AnalysisRecord, Deliverable, Message, PhaseRecord, PhaseType, Role};

/// Handle to send commands to the StateManager
#[derive(Clone)]
pub struct StateManager {
    tx: mpsc::Sender<StateCommand>,
}

impl StateManager {
    /// Spawn a new StateManager actor over the store in `store_dir`
    pub fn spawn(store_dir: impl AsRef<Path>) -> eyre::Result<Self> {
        debug!(store_dir = %store_dir.as_ref().display(), "spawn: called");
        let store = Store::open(store_dir.as_ref())?;
        Ok(Self::spawn_with_store(store))
    }

    /// Spawn over a throwaway in-memory store
    pub fn spawn_in_memory() -> eyre::Result<Self> {
        debug!("spawn_in_memory: called");
        let store = Store::open_in_memory()?;
        Ok(Self::spawn_with_store(store))
    }

    fn spawn_with_store(store: Store) -> Self {
        let (tx, rx) = mpsc::channel(256);

        tokio::spawn(actor_loop(store, rx));

        info!("StateManager spawned");
        Self { tx }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<StateResponse<T>>) -> StateCommand) -> StateResponse<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| StateError::ChannelError)?;
        reply_rx.await.map_err(|_| StateError::ChannelError)?
    }

    // === Message operations ===

    /// Append a message; the store assigns its sequence number
    pub async fn append_message(
        &self,
        project: &str,
        agent: AgentId,
        role: Role,
        content: impl Into<String>,
    ) -> StateResponse<Message> {
        debug!(%project, %agent, %role, "append_message: called");
        self.request(|reply| StateCommand::AppendMessage {
            project: project.to_string(),
            agent,
            role,
            content: content.into(),
            reply,
        })
        .await
    }

    /// Messages of a project in sequence order, optionally for one agent
    pub async fn list_messages(&self, project: &str, agent: Option<AgentId>) -> StateResponse<Vec<Message>> {
        debug!(%project, ?agent, "list_messages: called");
        self.request(|reply| StateCommand::ListMessages {
            project: project.to_string(),
            agent,
            reply,
        })
        .await
    }

    pub async fn count_messages(&self, project: &str, agent: AgentId) -> StateResponse<u64> {
        debug!(%project, %agent, "count_messages: called");
        self.request(|reply| StateCommand::CountMessages {
            project: project.to_string(),
            agent,
            reply,
        })
        .await
    }

    /// Delete every message of one (project, agent) transcript
    pub async fn delete_messages(&self, project: &str, agent: AgentId) -> StateResponse<usize> {
        debug!(%project, %agent, "delete_messages: called");
        self.request(|reply| StateCommand::DeleteMessages {
            project: project.to_string(),
            agent,
            reply,
        })
        .await
    }

    // === PhaseRecord operations ===

    /// Insert or replace a deliverable; `completed` never reverts
    pub async fn upsert_phase_record(
        &self,
        project: &str,
        phase_type: PhaseType,
        content: Deliverable,
        completed: bool,
    ) -> StateResponse<PhaseRecord> {
        debug!(%project, %phase_type, kind = content.kind(), %completed, "upsert_phase_record: called");
        self.request(|reply| StateCommand::UpsertPhaseRecord {
            project: project.to_string(),
            phase_type,
            content,
            completed,
            reply,
        })
        .await
    }

    pub async fn get_phase_record(&self, project: &str, phase_type: PhaseType) -> StateResponse<Option<PhaseRecord>> {
        debug!(%project, %phase_type, "get_phase_record: called");
        self.request(|reply| StateCommand::GetPhaseRecord {
            project: project.to_string(),
            phase_type,
            reply,
        })
        .await
    }

    pub async fn list_phase_records(&self, project: &str) -> StateResponse<Vec<PhaseRecord>> {
        debug!(%project, "list_phase_records: called");
        self.request(|reply| StateCommand::ListPhaseRecords {
            project: project.to_string(),
            reply,
        })
        .await
    }

    // === AnalysisRecord operations ===

    pub async fn upsert_analysis(
        &self,
        project: &str,
        agent: AgentId,
        capability_id: &str,
        content: impl Into<String>,
        completed: bool,
    ) -> StateResponse<AnalysisRecord> {
        debug!(%project, %agent, %capability_id, %completed, "upsert_analysis: called");
        self.request(|reply| StateCommand::UpsertAnalysis {
            project: project.to_string(),
            agent,
            capability_id: capability_id.to_string(),
            content: content.into(),
            completed,
            reply,
        })
        .await
    }

    pub async fn list_analyses(&self, project: &str, agent: AgentId) -> StateResponse<Vec<AnalysisRecord>> {
        debug!(%project, %agent, "list_analyses: called");
        self.request(|reply| StateCommand::ListAnalyses {
            project: project.to_string(),
            agent,
            reply,
        })
        .await
    }

    /// Shutdown the StateManager
    pub async fn shutdown(&self) -> Result<(), StateError> {
        debug!("shutdown: called");
        self.tx
            .send(StateCommand::Shutdown)
            .await
            .map_err(|_| StateError::ChannelError)
    }
}

fn store_err(e: eyre::Report) -> StateError {
    StateError::StoreError(format!("{:#}", e))
}

fn message_from_stored(stored: StoredMessage) -> StateResponse<Message> {
    let agent = stored.agent.parse::<AgentId>().map_err(StateError::DeserializationError)?;
    let role = stored.role.parse::<Role>().map_err(StateError::DeserializationError)?;
    Ok(Message {
        id: stored.id,
        seq: Some(stored.seq),
        project: stored.project,
        agent,
        role,
        content: stored.content,
        created_at: stored.created_at,
    })
}

fn phase_record_from_stored(stored: StoredPhaseRecord) -> StateResponse<PhaseRecord> {
    let phase_type = stored
        .phase_type
        .parse::<PhaseType>()
        .map_err(StateError::DeserializationError)?;
    let content: Deliverable = serde_json::from_str(&stored.content)
        .map_err(|e| StateError::DeserializationError(format!("{}/{}: {}", stored.project, phase_type, e)))?;
    Ok(PhaseRecord {
        project: stored.project,
        phase_type,
        content,
        completed: stored.completed,
        updated_at: stored.updated_at,
    })
}

fn analysis_from_stored(stored: StoredAnalysis) -> StateResponse<AnalysisRecord> {
    let agent = stored.agent.parse::<AgentId>().map_err(StateError::DeserializationError)?;
    Ok(AnalysisRecord {
        project: stored.project,
        agent,
        capability_id: stored.analysis_id,
        content: stored.content,
        completed: stored.completed,
        updated_at: stored.updated_at,
    })
}

/// Convert a batch, skipping rows that no longer parse
///
/// A row written by a different catalog version must not hide the rest.
fn convert_all<S, T>(rows: Vec<S>, convert: fn(S) -> StateResponse<T>) -> Vec<T> {
    rows.into_iter()
        .filter_map(|row| match convert(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "convert_all: skipping unreadable row");
                None
            }
        })
        .collect()
}

async fn actor_loop(mut store: Store, mut rx: mpsc::Receiver<StateCommand>) {
    debug!("StateManager actor started");

    while let Some(cmd) = rx.recv().await {
        match cmd {
            StateCommand::AppendMessage {
                project,
                agent,
                role,
                content,
                reply,
            } => {
                debug!(%project, %agent, %role, "actor_loop: AppendMessage command");
                let new = NewMessage {
                    id: uuid::Uuid::now_v7().to_string(),
                    project,
                    agent: agent.as_str().to_string(),
                    role: role.as_str().to_string(),
                    content,
                    created_at: phasestore::now_ms(),
                };
                let result = store
                    .append_message(new)
                    .map_err(store_err)
                    .and_then(message_from_stored);
                let _ = reply.send(result);
            }

            StateCommand::ListMessages { project, agent, reply } => {
                debug!(%project, ?agent, "actor_loop: ListMessages command");
                let rows = match agent {
                    Some(agent) => store.list_messages_for_agent(&project, agent.as_str()),
                    None => store.list_messages(&project),
                };
                let result = rows.map_err(store_err).map(|rows| convert_all(rows, message_from_stored));
                let _ = reply.send(result);
            }

            StateCommand::CountMessages { project, agent, reply } => {
                debug!(%project, %agent, "actor_loop: CountMessages command");
                let result = store.count_messages(&project, agent.as_str()).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::DeleteMessages { project, agent, reply } => {
                debug!(%project, %agent, "actor_loop: DeleteMessages command");
                let result = store.delete_messages(&project, agent.as_str()).map_err(store_err);
                let _ = reply.send(result);
            }

            StateCommand::UpsertPhaseRecord {
                project,
                phase_type,
                content,
                completed,
                reply,
            } => {
                debug!(%project, %phase_type, "actor_loop: UpsertPhaseRecord command");
                let result = serde_json::to_string(&content)
                    .map_err(|e| StateError::DeserializationError(e.to_string()))
                    .and_then(|json| {
                        store
                            .upsert_phase_record(&project, phase_type.as_str(), &json, completed)
                            .map_err(store_err)
                    })
                    .and_then(phase_record_from_stored);
                let _ = reply.send(result);
            }

            StateCommand::GetPhaseRecord {
                project,
                phase_type,
                reply,
            } => {
                debug!(%project, %phase_type, "actor_loop: GetPhaseRecord command");
                let result = store
                    .get_phase_record(&project, phase_type.as_str())
                    .map_err(store_err)
                    .and_then(|row| row.map(phase_record_from_stored).transpose());
                let _ = reply.send(result);
            }

            StateCommand::ListPhaseRecords { project, reply } => {
                debug!(%project, "actor_loop: ListPhaseRecords command");
                let result = store
                    .list_phase_records(&project)
                    .map_err(store_err)
                    .map(|rows| convert_all(rows, phase_record_from_stored));
                let _ = reply.send(result);
            }

            StateCommand::UpsertAnalysis {
                project,
                agent,
                capability_id,
                content,
                completed,
                reply,
            } => {
                debug!(%project, %agent, %capability_id, "actor_loop: UpsertAnalysis command");
                let result = store
                    .upsert_analysis(&project, agent.as_str(), &capability_id, &content, completed)
                    .map_err(store_err)
                    .and_then(analysis_from_stored);
                let _ = reply.send(result);
            }

            StateCommand::ListAnalyses { project, agent, reply } => {
                debug!(%project, %agent, "actor_loop: ListAnalyses command");
                let result = store
                    .list_analyses(&project, agent.as_str())
                    .map_err(store_err)
                    .map(|rows| convert_all(rows, analysis_from_stored));
                let _ = reply.send(result);
            }

            StateCommand::Shutdown => {
                debug!("actor_loop: Shutdown command");
                info!("StateManager shutting down");
                break;
            }
        }
    }

    debug!("StateManager actor stopped");
}
