//! Streaming chat session
//!
//! Drives one model round-trip per send: builds the agent's context from its
//! persisted transcript, streams the reply into a live in-memory entry, then
//! persists the final text exactly once.
//!
//! Session state sits behind a `std::sync::Mutex` that is never held across
//! an `.await`.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::types::{SessionError, SessionEvent, SessionSnapshot};
use crate::catalog::Catalog;
use crate::conversation::ConversationStore;
use crate::domain::{AgentId, Message, Role};
use crate::llm::{self, CompletionRequest, LlmClient, StreamChunk};
use crate::prompts::PromptLoader;
use crate::subscription::{Subscription, UsageKind};

const DEFAULT_MAX_TOKENS: u32 = 4096;

#[derive(Debug)]
struct SessionState {
    all_messages: Vec<Message>,
    in_flight: HashSet<AgentId>,
    is_loading: bool,
    current_agent: AgentId,
    last_error: Option<String>,
}

/// Clears an agent's in-flight mark however the send ends
struct InFlight {
    state: Arc<Mutex<SessionState>>,
    agent: AgentId,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.in_flight.remove(&self.agent);
    }
}

/// One user's chat session over a project
#[derive(Clone)]
pub struct ChatSession {
    project: String,
    catalog: Arc<Catalog>,
    conversations: ConversationStore,
    llm: Arc<dyn LlmClient>,
    subscription: Arc<dyn Subscription>,
    prompts: Arc<PromptLoader>,
    max_tokens: u32,
    state: Arc<Mutex<SessionState>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl ChatSession {
    pub fn new(
        project: impl Into<String>,
        catalog: Arc<Catalog>,
        conversations: ConversationStore,
        llm: Arc<dyn LlmClient>,
        subscription: Arc<dyn Subscription>,
        prompts: Arc<PromptLoader>,
    ) -> Self {
        let project = project.into();
        debug!(%project, "ChatSession::new: called");
        let (event_tx, _) = broadcast::channel(256);
        let first_agent = catalog
            .bindings_in_order()
            .first()
            .map(|b| b.agent)
            .unwrap_or(AgentId::Ba);
        Self {
            project,
            catalog,
            conversations,
            llm,
            subscription,
            prompts,
            max_tokens: DEFAULT_MAX_TOKENS,
            state: Arc::new(Mutex::new(SessionState {
                all_messages: Vec::new(),
                in_flight: HashSet::new(),
                is_loading: false,
                current_agent: first_agent,
                last_error: None,
            })),
            event_tx,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        f(&mut state)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.with_state(|s| SessionSnapshot {
            messages: s
                .all_messages
                .iter()
                .filter(|m| m.agent == s.current_agent)
                .cloned()
                .collect(),
            all_messages: s.all_messages.clone(),
            is_processing: s.in_flight.contains(&s.current_agent),
            is_loading: s.is_loading,
            current_agent: s.current_agent,
            last_error: s.last_error.clone(),
        })
    }

    pub fn current_agent(&self) -> AgentId {
        self.with_state(|s| s.current_agent)
    }

    pub fn set_current_agent(&self, agent: AgentId) {
        debug!(%agent, "set_current_agent: called");
        self.with_state(|s| s.current_agent = agent);
    }

    pub fn is_processing(&self, agent: AgentId) -> bool {
        self.with_state(|s| s.in_flight.contains(&agent))
    }

    pub fn last_error(&self) -> Option<String> {
        self.with_state(|s| s.last_error.clone())
    }

    pub fn clear_error(&self) {
        self.with_state(|s| s.last_error = None);
    }

    /// Replace the in-memory transcript with what the store holds
    ///
    /// Live replies still streaming are kept.
    pub async fn reload_messages(&self) -> Result<(), SessionError> {
        debug!(project = %self.project, "reload_messages: called");
        self.with_state(|s| s.is_loading = true);

        let result = self.conversations.fetch(&self.project).await;

        self.with_state(|s| {
            s.is_loading = false;
            match result {
                Ok(messages) => {
                    let live: Vec<Message> = s.all_messages.drain(..).filter(|m| !m.is_persisted()).collect();
                    s.all_messages = messages;
                    s.all_messages.extend(live);
                    Ok(())
                }
                Err(e) => {
                    warn!(error = %e, "reload_messages: failed");
                    s.last_error = Some(e.to_string());
                    Err(SessionError::Persistence(e))
                }
            }
        })
    }

    /// Delete an agent's transcript from the store and from memory
    pub async fn clear_messages(&self, agent: AgentId) -> Result<usize, SessionError> {
        debug!(project = %self.project, %agent, "clear_messages: called");
        let count = self.conversations.delete_all(&self.project, agent).await?;
        self.with_state(|s| s.all_messages.retain(|m| m.agent != agent || !m.is_persisted()));
        info!(project = %self.project, %agent, count, "Cleared transcript");
        Ok(count)
    }

    /// Send a turn to `agent` and return the full reply
    ///
    /// A silent turn is a hidden prompt: it is neither persisted nor shown.
    /// On failure the error is kept as `last_error` and None is returned.
    pub async fn send(&self, content: &str, agent: AgentId, silent: bool) -> Option<String> {
        self.try_send(content, agent, silent).await.ok()
    }

    /// Same as [`send`](Self::send) but returns the typed error
    ///
    /// Success clears `last_error`; failure sets it and broadcasts
    /// [`SessionEvent::Failed`].
    pub async fn try_send(&self, content: &str, agent: AgentId, silent: bool) -> Result<String, SessionError> {
        match self.exchange(content, agent, silent).await {
            Ok(text) => {
                self.clear_error();
                Ok(text)
            }
            Err(e) => {
                warn!(project = %self.project, %agent, error = %e, "try_send: failed");
                let message = e.user_message();
                self.with_state(|s| s.last_error = Some(message.clone()));
                let _ = self.event_tx.send(SessionEvent::Failed { agent, error: message });
                Err(e)
            }
        }
    }

    async fn exchange(&self, content: &str, agent: AgentId, silent: bool) -> Result<String, SessionError> {
        debug!(project = %self.project, %agent, %silent, len = content.len(), "exchange: called");

        let _in_flight = self.begin(agent)?;

        if !self.subscription.can_use_agent(agent) {
            return Err(SessionError::AgentLocked { agent });
        }
        if !self.subscription.can_send_message() {
            return Err(SessionError::QuotaExceeded);
        }

        let system_prompt = self
            .prompts
            .agent_system(&self.catalog, &self.project, agent)
            .map_err(|e| SessionError::Prompt(format!("{:#}", e)))?;

        let mut context: Vec<llm::Message> = self
            .conversations
            .transcript(&self.project, agent)
            .await?
            .into_iter()
            .map(|m| llm::Message {
                role: m.role,
                content: m.content,
            })
            .collect();
        context.push(llm::Message::user(content));

        if !silent {
            let user_message = self
                .conversations
                .append(&self.project, Role::User, content, agent)
                .await?;
            self.with_state(|s| {
                s.all_messages.push(user_message);
                s.current_agent = agent;
            });
        }

        let request = CompletionRequest {
            system_prompt,
            messages: context,
            max_tokens: self.max_tokens,
        };

        let draft_id = format!("live-{}", uuid::Uuid::now_v7());
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);

        let stream = self.llm.stream(request, chunk_tx);
        let drafting = async {
            let mut buffer = String::new();
            while let Some(chunk) = chunk_rx.recv().await {
                if let StreamChunk::TextDelta(text) = chunk {
                    buffer.push_str(&text);
                    self.update_draft(agent, &draft_id, &buffer);
                    let _ = self.event_tx.send(SessionEvent::Delta { agent, text });
                }
            }
        };
        let (result, ()) = tokio::join!(stream, drafting);

        let text = match result {
            Ok(response) if !response.content.trim().is_empty() => response.content,
            Ok(_) => {
                self.drop_draft(&draft_id);
                return Err(SessionError::EmptyReply);
            }
            Err(e) => {
                // Partial output is discarded; the user resends
                self.drop_draft(&draft_id);
                return Err(SessionError::Llm(e));
            }
        };

        let persisted = match self
            .conversations
            .append(&self.project, Role::Assistant, &text, agent)
            .await
        {
            Ok(message) => message,
            Err(e) => {
                self.drop_draft(&draft_id);
                return Err(SessionError::Persistence(e));
            }
        };

        self.with_state(|s| match s.all_messages.iter_mut().find(|m| m.id == draft_id) {
            Some(draft) => *draft = persisted.clone(),
            None => s.all_messages.push(persisted.clone()),
        });
        self.subscription.record_usage(UsageKind::Message);

        info!(project = %self.project, %agent, len = text.len(), "Reply persisted");
        let _ = self.event_tx.send(SessionEvent::Completed {
            agent,
            message: persisted,
        });
        Ok(text)
    }

    fn begin(&self, agent: AgentId) -> Result<InFlight, SessionError> {
        self.with_state(|s| {
            if !s.in_flight.insert(agent) {
                debug!(%agent, "begin: rejected, send already in flight");
                return Err(SessionError::Busy { agent });
            }
            Ok(())
        })?;
        Ok(InFlight {
            state: Arc::clone(&self.state),
            agent,
        })
    }

    /// Replace the live reply for this send with the text so far
    fn update_draft(&self, agent: AgentId, draft_id: &str, text: &str) {
        self.with_state(|s| match s.all_messages.iter_mut().find(|m| m.id == draft_id) {
            Some(draft) => draft.content = text.to_string(),
            None => s.all_messages.push(Message {
                id: draft_id.to_string(),
                seq: None,
                project: self.project.clone(),
                agent,
                role: Role::Assistant,
                content: text.to_string(),
                created_at: phasestore::now_ms(),
            }),
        });
    }

    fn drop_draft(&self, draft_id: &str) {
        self.with_state(|s| s.all_messages.retain(|m| m.id != draft_id));
    }
}
