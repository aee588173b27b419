//! Catalog definitions as they appear in YAML

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{AgentId, PhaseType, Tier};

/// Top-level workflow file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub phases: Vec<PhaseDef>,
    pub agents: BTreeMap<AgentId, AgentDef>,
    pub profiles: BTreeMap<PhaseType, SynthesisProfile>,
}

/// A top-level phase
///
/// Either binds an agent and phase type directly, or lists subphases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseDef {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub agent: Option<AgentId>,

    #[serde(rename = "phase-type", default)]
    pub phase_type: Option<PhaseType>,

    #[serde(default)]
    pub subphases: Vec<SubphaseDef>,
}

impl PhaseDef {
    pub fn has_subphases(&self) -> bool {
        !self.subphases.is_empty()
    }
}

/// A subphase, always bound to exactly one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubphaseDef {
    pub id: String,
    pub title: String,
    pub agent: AgentId,

    #[serde(rename = "phase-type")]
    pub phase_type: PhaseType,
}

/// Persona and gating for one agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDef {
    /// Persona name shown in chat
    pub name: String,
    pub title: String,

    /// What this agent works towards; rendered into its system prompt
    #[serde(default)]
    pub focus: String,

    #[serde(rename = "min-tier", default)]
    pub min_tier: Tier,

    /// Conversation depth required before a document can be generated
    #[serde(rename = "generation-floor")]
    pub generation_floor: u32,

    #[serde(default)]
    pub capabilities: Vec<Capability>,
}

/// A progressively unlocked secondary analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub title: String,

    /// Sent to the agent as a normal user turn when triggered
    pub prompt: String,

    #[serde(rename = "min-messages")]
    pub min_messages: u32,

    #[serde(rename = "depends-on", default)]
    pub depends_on: Option<String>,
}

/// Heuristic markers and forced-synthesis keys for one phase type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisProfile {
    #[serde(rename = "document-title")]
    pub document_title: String,

    /// Phrases whose presence suggests a message is a finished document
    pub markers: Vec<String>,

    /// Keys the forced-synthesis JSON object must carry
    #[serde(rename = "required-keys")]
    pub required_keys: Vec<String>,
}

/// Where an agent sits in the phase graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentBinding {
    pub agent: AgentId,

    /// The node the agent drives (a phase id or a subphase id)
    pub node_id: String,

    /// The enclosing top-level phase
    pub phase_id: String,

    pub phase_type: PhaseType,
}
