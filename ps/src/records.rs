//! Row types returned by the store
//!
//! Keys are plain strings here; the engine maps them onto its own enums.

use serde::{Deserialize, Serialize};

/// A message to be appended (the store assigns `seq`)
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: String,
    pub project: String,
    pub agent: String,
    pub role: String,
    pub content: String,
    pub created_at: i64,
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Store-assigned, strictly increasing across the whole database
    pub seq: i64,
    pub id: String,
    pub project: String,
    pub agent: String,
    pub role: String,
    pub content: String,
    /// Unix milliseconds
    pub created_at: i64,
}

/// A persisted phase deliverable
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPhaseRecord {
    pub project: String,
    pub phase_type: String,
    /// Serialized deliverable (JSON text)
    pub content: String,
    pub completed: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A persisted capability analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub project: String,
    pub agent: String,
    pub analysis_id: String,
    pub content: String,
    pub completed: bool,
    pub updated_at: i64,
}
