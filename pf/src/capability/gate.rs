//! Progressive unlock rules for capabilities
//!
//! A capability unlocks once its agent's transcript holds enough messages and
//! the capability it depends on (if any) has a completed analysis. For a fixed
//! set of analyses, unlocking never reverses as the transcript grows.

use serde::Serialize;

use crate::catalog::{Capability, Catalog};
use crate::domain::{AgentId, AnalysisRecord};

/// Display row for one capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapabilityStatus {
    pub id: String,
    pub title: String,
    pub min_messages: u32,
    pub unlocked: bool,
    /// Percent of the message threshold reached, 0..=100
    pub progress: u8,
    /// A completed analysis exists
    pub completed: bool,
    /// Dependency still missing a completed analysis
    pub blocked_by: Option<String>,
}

/// The dependency that keeps `capability` locked, if any
pub fn blocked_by<'a>(capability: &'a Capability, analyses: &[AnalysisRecord]) -> Option<&'a str> {
    let dep = capability.depends_on.as_deref()?;
    let satisfied = analyses.iter().any(|a| a.capability_id == dep && a.completed);
    if satisfied { None } else { Some(dep) }
}

pub fn is_unlocked(capability: &Capability, message_count: u64, analyses: &[AnalysisRecord]) -> bool {
    message_count >= u64::from(capability.min_messages) && blocked_by(capability, analyses).is_none()
}

/// `min(100, round(100 * count / min_messages))`
pub fn progress(capability: &Capability, message_count: u64) -> u8 {
    let min = u64::from(capability.min_messages);
    if min == 0 {
        return 100;
    }
    // Half-up rounding in integers
    let pct = (200 * message_count + min) / (2 * min);
    pct.min(100) as u8
}

/// Status of every capability of `agent`, in catalog order
pub fn statuses(
    catalog: &Catalog,
    agent: AgentId,
    message_count: u64,
    analyses: &[AnalysisRecord],
) -> Vec<CapabilityStatus> {
    catalog
        .capabilities(agent)
        .iter()
        .map(|cap| CapabilityStatus {
            id: cap.id.clone(),
            title: cap.title.clone(),
            min_messages: cap.min_messages,
            unlocked: is_unlocked(cap, message_count, analyses),
            progress: progress(cap, message_count),
            completed: analyses.iter().any(|a| a.capability_id == cap.id && a.completed),
            blocked_by: blocked_by(cap, analyses).map(String::from),
        })
        .collect()
}
