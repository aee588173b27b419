//! Per-project facade over the engine
//!
//! [`Services`] holds what every project shares. [`ProjectView`] answers the
//! read-only questions and runs phase resets without a model client.
//! [`Workflow`] adds chat, capability runs and document generation.

use std::collections::HashSet;
use std::sync::Arc;

use eyre::{Context, Result};
use thiserror::Error;
use tracing::{debug, info};

use crate::capability::{self, CapabilityError, CapabilityRunner, CapabilityStatus};
use crate::catalog::Catalog;
use crate::config::Config;
use crate::conversation::ConversationStore;
use crate::domain::{AgentId, AnalysisRecord, Message, PhaseRecord};
use crate::llm::LlmClient;
use crate::phase::{self, NodeAccess, NodeStatus, PhaseGraph};
use crate::prompts::PromptLoader;
use crate::session::{ChatSession, SessionError};
use crate::state::{StateError, StateManager};
use crate::subscription::{LocalSubscription, Subscription};
use crate::synthesis::{DocumentSynthesizer, Synthesis, SynthesisError};

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{agent}'s phase is locked until the previous phase is completed")]
    PhaseLocked { agent: AgentId },

    #[error("Your plan does not include the {agent} agent")]
    AgentLocked { agent: AgentId },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("Persistence failed: {0}")]
    Persistence(#[from] StateError),
}

impl WorkflowError {
    pub fn user_message(&self) -> String {
        match self {
            WorkflowError::Session(e) => e.user_message(),
            WorkflowError::Capability(CapabilityError::Session(e)) => e.user_message(),
            WorkflowError::Synthesis(e) => e.user_message(),
            other => other.to_string(),
        }
    }
}

/// Shared handles for every project in one process
#[derive(Clone)]
pub struct Services {
    pub catalog: Arc<Catalog>,
    pub state: StateManager,
    pub subscription: Arc<dyn Subscription>,
    pub prompts: Arc<PromptLoader>,
    pub config: Config,
}

impl Services {
    /// Build from config: catalog, store actor, plan and prompts
    pub fn open(config: &Config) -> Result<Self> {
        debug!("Services::open: called");
        let catalog = Arc::new(Catalog::load(config.catalog.path.as_deref()).context("Failed to load workflow catalog")?);
        let store_dir = config.storage.store_path();
        let state = StateManager::spawn(&store_dir)
            .with_context(|| format!("Failed to open store at {}", store_dir.display()))?;
        let subscription: Arc<dyn Subscription> = Arc::new(LocalSubscription::new(&config.subscription, &catalog));
        let prompts = Arc::new(PromptLoader::new(config.prompts.dir.clone()));
        Ok(Self {
            catalog,
            state,
            subscription,
            prompts,
            config: config.clone(),
        })
    }

    /// In-memory store and the given plan; used by tests and dry runs
    pub fn in_memory(config: Config, subscription: Arc<dyn Subscription>) -> Result<Self> {
        let catalog = Arc::new(Catalog::load(config.catalog.path.as_deref())?);
        Ok(Self {
            catalog,
            state: StateManager::spawn_in_memory()?,
            subscription,
            prompts: Arc::new(PromptLoader::new(config.prompts.dir.clone())),
            config,
        })
    }
}

/// One agent's row in the project status
#[derive(Debug, Clone)]
pub struct AgentStatus {
    pub agent: AgentId,
    pub name: String,
    pub title: String,
    pub node_id: String,
    pub access: NodeAccess,
    pub message_count: u64,
    pub can_generate: bool,
}

#[derive(Debug, Clone)]
pub struct ProjectStatus {
    pub graph: PhaseGraph,
    pub agents: Vec<AgentStatus>,
}

/// Read-only view of a project, plus phase reset
#[derive(Clone)]
pub struct ProjectView {
    project: String,
    services: Services,
    conversations: ConversationStore,
}

impl ProjectView {
    pub fn new(services: &Services, project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            conversations: ConversationStore::new(services.state.clone()),
            services: services.clone(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn catalog(&self) -> &Catalog {
        &self.services.catalog
    }

    pub async fn graph(&self) -> Result<PhaseGraph, WorkflowError> {
        let completed: HashSet<_> = self
            .services
            .state
            .list_phase_records(&self.project)
            .await?
            .into_iter()
            .filter(|r| r.completed)
            .map(|r| r.phase_type)
            .collect();
        Ok(phase::recompute(&self.services.catalog, &completed))
    }

    pub async fn access(&self, agent: AgentId) -> Result<NodeAccess, WorkflowError> {
        let graph = self.graph().await?;
        Ok(NodeAccess::for_agent(&graph, self.services.subscription.as_ref(), agent))
    }

    /// Fail unless the agent may be selected
    pub async fn ensure_selectable(&self, agent: AgentId) -> Result<(), WorkflowError> {
        let access = self.access(agent).await?;
        if access.tier_locked {
            return Err(WorkflowError::AgentLocked { agent });
        }
        if access.status == NodeStatus::Locked {
            return Err(WorkflowError::PhaseLocked { agent });
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<ProjectStatus, WorkflowError> {
        debug!(project = %self.project, "ProjectView::status: called");
        let graph = self.graph().await?;
        let mut agents = Vec::new();
        for binding in self.services.catalog.bindings_in_order() {
            let def = self.services.catalog.agent(binding.agent);
            let message_count = self.conversations.count(&self.project, binding.agent).await?;
            agents.push(AgentStatus {
                agent: binding.agent,
                name: def.name.clone(),
                title: def.title.clone(),
                node_id: binding.node_id.clone(),
                access: NodeAccess::for_agent(&graph, self.services.subscription.as_ref(), binding.agent),
                message_count,
                can_generate: message_count >= u64::from(def.generation_floor),
            });
        }
        Ok(ProjectStatus { graph, agents })
    }

    pub async fn capabilities(&self, agent: AgentId) -> Result<Vec<CapabilityStatus>, WorkflowError> {
        let count = self.conversations.count(&self.project, agent).await?;
        let analyses = self.services.state.list_analyses(&self.project, agent).await?;
        Ok(capability::statuses(&self.services.catalog, agent, count, &analyses))
    }

    pub async fn deliverable(&self, agent: AgentId) -> Result<Option<PhaseRecord>, WorkflowError> {
        let phase_type = self.services.catalog.phase_type_for(agent);
        Ok(self.services.state.get_phase_record(&self.project, phase_type).await?)
    }

    pub async fn history(&self, agent: AgentId) -> Result<Vec<Message>, WorkflowError> {
        Ok(self.conversations.transcript(&self.project, agent).await?)
    }

    /// No persisted messages yet, so the agent should introduce itself
    pub async fn needs_introduction(&self, agent: AgentId) -> Result<bool, WorkflowError> {
        Ok(self.conversations.count(&self.project, agent).await? == 0)
    }

    /// Delete the agent's transcript; deliverables and analyses are kept
    pub async fn reset(&self, agent: AgentId) -> Result<usize, WorkflowError> {
        let count = self.conversations.delete_all(&self.project, agent).await?;
        info!(project = %self.project, %agent, count, "Phase reset");
        Ok(count)
    }
}

/// Full per-project engine
pub struct Workflow {
    view: ProjectView,
    session: ChatSession,
    runner: CapabilityRunner,
    synthesizer: DocumentSynthesizer,
}

impl Workflow {
    pub fn new(services: &Services, project: impl Into<String>, llm: Arc<dyn LlmClient>) -> Self {
        let view = ProjectView::new(services, project);
        debug!(project = %view.project, "Workflow::new: called");

        let session = ChatSession::new(
            view.project.clone(),
            services.catalog.clone(),
            view.conversations.clone(),
            llm.clone(),
            services.subscription.clone(),
            services.prompts.clone(),
        )
        .with_max_tokens(services.config.prompts.chat_max_tokens);

        let runner = CapabilityRunner::new(
            services.catalog.clone(),
            session.clone(),
            view.conversations.clone(),
            services.state.clone(),
        );

        let synthesizer = DocumentSynthesizer::new(
            services.catalog.clone(),
            services.state.clone(),
            llm,
            services.subscription.clone(),
            services.prompts.clone(),
            services.config.synthesis.clone(),
        );

        Self {
            view,
            session,
            runner,
            synthesizer,
        }
    }

    pub fn view(&self) -> &ProjectView {
        &self.view
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    /// Make `agent` current and load the project's transcript
    pub async fn select_agent(&self, agent: AgentId) -> Result<(), WorkflowError> {
        self.view.ensure_selectable(agent).await?;
        self.session.set_current_agent(agent);
        self.session.reload_messages().await?;
        Ok(())
    }

    /// Silent introduction; returns the greeting
    pub async fn introduce(&self, agent: AgentId) -> Result<String, WorkflowError> {
        let prompt = self
            .view
            .services
            .prompts
            .introduction(self.view.catalog(), &self.view.project, agent)
            .map_err(|e| SessionError::Prompt(format!("{:#}", e)))?;
        Ok(self.session.try_send(&prompt, agent, true).await?)
    }

    pub async fn chat(&self, agent: AgentId, content: &str) -> Result<String, WorkflowError> {
        Ok(self.session.try_send(content, agent, false).await?)
    }

    pub async fn analyze(&self, agent: AgentId, capability_id: &str) -> Result<AnalysisRecord, WorkflowError> {
        self.view.ensure_selectable(agent).await?;
        Ok(self.runner.run(agent, capability_id).await?)
    }

    pub async fn generate(&self, agent: AgentId, instructions: Option<&str>) -> Result<Synthesis, WorkflowError> {
        self.view.ensure_selectable(agent).await?;
        let transcript = self.view.history(agent).await?;
        Ok(self
            .synthesizer
            .generate(&self.view.project, agent, &transcript, instructions)
            .await?)
    }

    pub async fn regenerate(&self, agent: AgentId, instructions: &str) -> Result<Synthesis, WorkflowError> {
        self.view.ensure_selectable(agent).await?;
        let transcript = self.view.history(agent).await?;
        Ok(self
            .synthesizer
            .regenerate(&self.view.project, agent, &transcript, instructions)
            .await?)
    }

    /// Phase reset through the session so its in-memory transcript follows
    pub async fn reset(&self, agent: AgentId) -> Result<usize, WorkflowError> {
        let count = self.session.clear_messages(agent).await?;
        info!(project = %self.view.project, %agent, count, "Phase reset");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PhaseType, Role, Tier};
    use crate::llm::client::mock::MockLlmClient;

    fn services(tier: Tier) -> Services {
        let config = Config::default();
        let catalog = Catalog::builtin().unwrap();
        let subscription: Arc<dyn Subscription> = Arc::new(LocalSubscription::unlimited(tier, &catalog));
        Services::in_memory(config, subscription).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_project_status() {
        let view = ProjectView::new(&services(Tier::Free), "acme");
        let status = view.status().await.unwrap();

        assert_eq!(status.agents.len(), 5);
        assert_eq!(status.agents[0].agent, AgentId::Ba);
        assert_eq!(status.agents[0].access.status, NodeStatus::Active);
        assert!(!status.agents[0].can_generate);

        let ux = status.agents.iter().find(|a| a.agent == AgentId::Ux).unwrap();
        assert!(ux.access.tier_locked);
    }

    #[tokio::test]
    async fn test_locked_phase_cannot_be_selected() {
        let svc = services(Tier::Pro);
        let workflow = Workflow::new(&svc, "acme", Arc::new(MockLlmClient::new(vec![])));
        let err = workflow.select_agent(AgentId::Architect).await.unwrap_err();
        assert!(matches!(err, WorkflowError::PhaseLocked { agent: AgentId::Architect }));
        assert!(workflow.select_agent(AgentId::Ba).await.is_ok());
    }

    #[tokio::test]
    async fn test_tier_locked_agent_cannot_generate() {
        let svc = services(Tier::Free);
        svc.state
            .upsert_phase_record(
                "acme",
                PhaseType::ProjectBrief,
                crate::domain::Deliverable::FormattedText("brief".to_string()),
                true,
            )
            .await
            .unwrap();
        let workflow = Workflow::new(&svc, "acme", Arc::new(MockLlmClient::new(vec![])));
        let err = workflow.generate(AgentId::Ux, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::AgentLocked { agent: AgentId::Ux }));
    }

    #[tokio::test]
    async fn test_introduction_then_reset_needs_it_again() {
        let svc = services(Tier::Pro);
        let workflow = Workflow::new(
            &svc,
            "acme",
            Arc::new(MockLlmClient::with_texts(&["Hi, I'm Mary, your Business Analyst."])),
        );

        assert!(workflow.view().needs_introduction(AgentId::Ba).await.unwrap());
        workflow.introduce(AgentId::Ba).await.unwrap();

        let history = workflow.view().history(AgentId::Ba).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
        assert!(!workflow.view().needs_introduction(AgentId::Ba).await.unwrap());

        assert_eq!(workflow.reset(AgentId::Ba).await.unwrap(), 1);
        assert!(workflow.view().needs_introduction(AgentId::Ba).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_chat_is_visible_to_session_consumers() {
        use crate::llm::client::mock::MockReply;
        use crate::session::SessionEvent;

        let svc = services(Tier::Pro);
        let workflow = Workflow::new(
            &svc,
            "acme",
            Arc::new(MockLlmClient::new(vec![MockReply::Unauthorized, MockReply::text("Welcome back")])),
        );
        let mut events = workflow.session().subscribe();

        let err = workflow.chat(AgentId::Ba, "hello").await.unwrap_err();
        let last_error = workflow.session().snapshot().last_error.unwrap();
        assert_eq!(last_error, err.user_message());
        let failed = std::iter::from_fn(|| events.try_recv().ok()).any(|e| matches!(e, SessionEvent::Failed { .. }));
        assert!(failed);

        workflow.chat(AgentId::Ba, "hello again").await.unwrap();
        assert!(workflow.session().snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn test_reset_keeps_deliverable() {
        let svc = services(Tier::Pro);
        svc.state
            .upsert_phase_record(
                "acme",
                PhaseType::ProjectBrief,
                crate::domain::Deliverable::FormattedText("brief".to_string()),
                true,
            )
            .await
            .unwrap();
        let view = ProjectView::new(&svc, "acme");
        view.reset(AgentId::Ba).await.unwrap();
        assert!(view.deliverable(AgentId::Ba).await.unwrap().is_some());
        assert_eq!(view.graph().await.unwrap().status("discovery"), Some(NodeStatus::Completed));
    }
}
