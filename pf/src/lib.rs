//! PhaseForge - Conversation-Driven Phase Progression Engine
//!
//! PhaseForge walks an idea through an ordered set of phases, each driven by
//! one AI agent. Every agent keeps its own persisted transcript; a phase is
//! complete once its deliverable has been written.
//!
//! # Core Concepts
//!
//! - **Transcripts are the source of truth**: every model call rebuilds its
//!   context from the agent's stored messages
//! - **Derived progress**: phase and subphase state is recomputed from the
//!   set of completed deliverables, never stored
//! - **Progressive capabilities**: secondary analyses unlock with
//!   conversation depth and their dependencies
//! - **Extraction before synthesis**: a finished document already in the
//!   chat is kept verbatim instead of paying for another model call
//!
//! # Modules
//!
//! - [`catalog`] - Phases, agents, capabilities and synthesis profiles
//! - [`conversation`] - Per-agent message log
//! - [`session`] - Streaming chat session
//! - [`capability`] - Capability unlock rules and runs
//! - [`phase`] - Phase graph derivation
//! - [`synthesis`] - Deliverable extraction and generation
//! - [`llm`] - Model client trait and chat-completions gateway
//! - [`workflow`] - Per-project facade for the CLI and REPL

pub mod capability;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod conversation;
pub mod domain;
pub mod llm;
pub mod phase;
pub mod prompts;
pub mod repl;
pub mod session;
pub mod state;
pub mod subscription;
pub mod synthesis;
pub mod workflow;

// Re-export commonly used types
pub use catalog::Catalog;
pub use config::{Config, LlmConfig};
pub use conversation::ConversationStore;
pub use domain::{AgentId, AnalysisRecord, Deliverable, Message, PhaseRecord, PhaseType, Role, Tier};
pub use llm::{CompletionRequest, CompletionResponse, GatewayClient, LlmClient, LlmError, StreamChunk, create_client};
pub use phase::{NodeAccess, NodeStatus, PhaseGraph};
pub use session::{ChatSession, SessionError, SessionEvent, SessionSnapshot};
pub use state::{StateError, StateManager};
pub use subscription::{LocalSubscription, Subscription, UsageKind};
pub use synthesis::{DocumentSynthesizer, SynthesisError, SynthesisSource};
pub use workflow::{ProjectView, Services, Workflow, WorkflowError};
