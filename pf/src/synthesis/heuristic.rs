//! Heuristic document extraction
//!
//! Agents usually write the finished document into the chat before anyone
//! asks for it. Spotting that message avoids a second model call. The checks
//! are deliberately cheap: length, phase markers, numbered section headers
//! and the absence of open questions.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::catalog::SynthesisProfile;
use crate::config::SynthesisConfig;
use crate::domain::Message;

/// Self-introductions and greetings, checked against the opening of a message
static INTRO_SIGNATURE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i:^\s*(?:hi|hello|hey|greetings|welcome)\b|\bmy name is\b|\bnice to meet you\b)|\b(?i:i'?m) [A-Z][a-z]+, (?i:your|the)\b",
    )
    .expect("intro signature pattern is valid")
});

/// `1. Title` at the start of a line
static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\d+\.\s+[A-Z]").expect("section header pattern is valid"));

/// Phrases of an agent that is still gathering information
const STILL_ASKING: &[&str] = &[
    "before i draft",
    "before i write",
    "a few more questions",
    "a few questions",
    "could you tell me",
    "can you tell me",
    "could you share",
    "can you share",
    "help me understand",
    "i'd like to understand",
    "i need to know",
];

/// How much of a message the introduction check looks at
const INTRO_WINDOW: usize = 300;

/// Why a candidate was accepted or passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Introduction,
    TooShort { chars: usize },
    FewMarkers { found: usize },
    FewSections { found: usize },
    StillAsking { phrase: &'static str },
}

/// Thresholds a message must meet to count as a finished document
#[derive(Debug, Clone, Copy)]
pub struct Thresholds {
    pub min_chars: usize,
    pub min_markers: usize,
    pub min_sections: usize,
}

impl From<&SynthesisConfig> for Thresholds {
    fn from(config: &SynthesisConfig) -> Self {
        Self {
            min_chars: config.min_document_chars,
            min_markers: config.min_markers,
            min_sections: config.min_sections,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self::from(&SynthesisConfig::default())
    }
}

fn opening(text: &str) -> &str {
    match text.char_indices().nth(INTRO_WINDOW) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Distinct markers present, case-insensitive
pub fn count_markers(text: &str, markers: &[String]) -> usize {
    let lower = text.to_lowercase();
    markers
        .iter()
        .filter(|m| !m.is_empty() && lower.contains(&m.to_lowercase()))
        .count()
}

pub fn count_sections(text: &str) -> usize {
    SECTION_HEADER.find_iter(text).count()
}

/// Judge one assistant message
pub fn evaluate(text: &str, profile: &SynthesisProfile, thresholds: &Thresholds) -> Verdict {
    if INTRO_SIGNATURE.is_match(opening(text)) {
        return Verdict::Introduction;
    }

    let chars = text.chars().count();
    if chars < thresholds.min_chars {
        return Verdict::TooShort { chars };
    }

    let markers = count_markers(text, &profile.markers);
    if markers < thresholds.min_markers {
        return Verdict::FewMarkers { found: markers };
    }

    let sections = count_sections(text);
    if sections < thresholds.min_sections {
        return Verdict::FewSections { found: sections };
    }

    let lower = text.to_lowercase();
    if let Some(phrase) = STILL_ASKING.iter().find(|p| lower.contains(*p)) {
        return Verdict::StillAsking { phrase };
    }

    Verdict::Accepted
}

/// Missed exactly one structural threshold by one
fn is_near_miss(verdict: &Verdict, thresholds: &Thresholds) -> bool {
    match verdict {
        Verdict::FewMarkers { found } => found + 1 >= thresholds.min_markers,
        Verdict::FewSections { found } => found + 1 >= thresholds.min_sections,
        _ => false,
    }
}

/// Newest assistant message that reads as a finished document
///
/// `transcript` is in store order, oldest first. The result is the same for
/// the same transcript and thresholds.
pub fn extract<'a>(transcript: &'a [Message], profile: &SynthesisProfile, thresholds: &Thresholds) -> Option<&'a Message> {
    debug!(messages = transcript.len(), "extract: called");
    for message in transcript.iter().rev().filter(|m| m.is_assistant()) {
        let verdict = evaluate(&message.content, profile, thresholds);
        if verdict == Verdict::Accepted {
            debug!(id = %message.id, "extract: accepted candidate");
            return Some(message);
        }
        if is_near_miss(&verdict, thresholds) {
            info!(id = %message.id, ?verdict, "Near-miss document; falling back to synthesis");
        } else {
            debug!(id = %message.id, ?verdict, "extract: skipped candidate");
        }
    }
    None
}
