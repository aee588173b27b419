//! Capability analysis records

use super::AgentId;

/// The persisted output of one capability run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRecord {
    pub project: String,
    pub agent: AgentId,
    pub capability_id: String,
    pub content: String,
    pub completed: bool,
    pub updated_at: i64,
}
