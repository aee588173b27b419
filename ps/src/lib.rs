//! PhaseStore - SQLite persistence for PhaseForge
//!
//! Holds three collections, each keyed the way the engine addresses them:
//!
//! - **messages**: append-only chat log, partitioned by (project, agent) and
//!   ordered by a store-assigned sequence number
//! - **phase_records**: one deliverable per (project, phase_type)
//! - **analysis_records**: one capability output per (project, agent, analysis_id)
//!
//! Upserts are last-write-wins on content. The `completed` flag is sticky:
//! once a record is written as completed, later writes cannot clear it.

mod records;
mod store;

pub use records::{NewMessage, StoredAnalysis, StoredMessage, StoredPhaseRecord};
pub use store::Store;

/// Current time as Unix milliseconds
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
