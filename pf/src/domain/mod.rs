//! Domain types for PhaseForge
//!
//! Agents, messages, deliverables and analyses. The persistence layer stores
//! these as plain strings and JSON; conversion happens in the state actor.

mod agent;
mod analysis;
mod deliverable;
mod message;

pub use agent::{AgentId, Tier};
pub use analysis::AnalysisRecord;
pub use deliverable::{Deliverable, PhaseRecord, PhaseType};
pub use message::{Message, Role};
