//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Agent persona system prompt
pub const AGENT: &str = include_str!("../../prompts/agent.pmt");

/// Hidden user turn that makes an agent introduce itself
pub const INTRO: &str = include_str!("../../prompts/intro.pmt");

/// Forced document synthesis system prompt
pub const SYNTHESIS: &str = include_str!("../../prompts/synthesis.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "agent" => Some(AGENT),
        "intro" => Some(INTRO),
        "synthesis" => Some(SYNTHESIS),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}
