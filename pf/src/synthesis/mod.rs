//! Deliverable synthesis: heuristic extraction with a forced fallback

pub mod heuristic;
mod parse;
mod synthesizer;

pub use parse::parse_object;
pub use synthesizer::{DocumentSynthesizer, Synthesis, SynthesisError, SynthesisSource};
