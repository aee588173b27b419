//! Capabilities: secondary analyses unlocked by conversation depth

mod followup;
pub mod gate;
mod runner;

pub use followup::strip_follow_up;
pub use gate::{CapabilityStatus, is_unlocked, progress, statuses};
pub use runner::{CapabilityError, CapabilityRunner};
