//! Streaming chat session
//!
//! The consumer contract: a snapshot of the transcript and flags, the
//! `send` / `set_current_agent` / `reload_messages` / `clear_messages`
//! operations, and a broadcast of live events.

mod chat;
mod types;

pub use chat::ChatSession;
pub use types::{SessionError, SessionEvent, SessionSnapshot};
