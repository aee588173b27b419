//! Trailing follow-up question removal
//!
//! Agents tend to end an analysis with an offer such as "Would you like me to
//! dig deeper?". The stored analysis drops that last paragraph, and any
//! horizontal rule that introduced it.

use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

/// Paragraph that opens with an interrogative or an offer, optionally after a rule
static FOLLOW_UP_OPENER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:-{3,}|\*{3,}|_{3,})\s*\n\s*)?(?:\*\*|_)?(?:does this|would you|shall i|should i|do you|is there anything|are there any|can i|could you|want me to|let me know|what do you think|how does this|ready to)\b",
    )
    .expect("follow-up opener pattern is valid")
});

/// A horizontal rule left dangling at the end
static TRAILING_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\s*(?:-{3,}|\*{3,}|_{3,})\s*$").expect("trailing rule pattern is valid"));

/// Remove a trailing follow-up question paragraph
///
/// Only the final paragraph is examined. Text without a paragraph break is
/// returned unchanged (trimmed) so a one-paragraph answer is never emptied.
/// Line endings are normalised to `\n`.
pub fn strip_follow_up(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let trimmed = normalized.trim_end();
    let Some(brk) = trimmed.rfind("\n\n") else {
        return trimmed.to_string();
    };

    let tail = trimmed[brk..].trim_start();
    if !FOLLOW_UP_OPENER.is_match(tail) {
        return trimmed.to_string();
    }

    let head = trimmed[..brk].trim_end();
    let head = match TRAILING_RULE.find(head) {
        Some(m) => head[..m.start()].trim_end(),
        None => head,
    };
    debug!(removed = trimmed.len() - head.len(), "strip_follow_up: removed trailing question");
    head.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_trailing_question() {
        let text = "## Pain Points\n\n1. Manual entry\n2. Slow approvals\n\nWould you like me to expand on any of these?";
        assert_eq!(strip_follow_up(text), "## Pain Points\n\n1. Manual entry\n2. Slow approvals");
    }

    #[test]
    fn test_strips_rule_before_question() {
        let text = "Analysis body.\n\n---\n\nDoes this match what you've seen?\n";
        assert_eq!(strip_follow_up(text), "Analysis body.");
    }

    #[test]
    fn test_strips_rule_in_same_paragraph() {
        let text = "Analysis body.\n\n---\nShall I continue with the competitor scan?";
        assert_eq!(strip_follow_up(text), "Analysis body.");
    }

    #[test]
    fn test_strips_bold_opener() {
        let text = "Body.\n\n**What do you think** about this ranking?";
        assert_eq!(strip_follow_up(text), "Body.");
    }

    #[test]
    fn test_keeps_statement_ending() {
        let text = "Body.\n\nOverall, the biggest risk is adoption.";
        assert_eq!(strip_follow_up(text), text);
    }

    #[test]
    fn test_keeps_question_inside_body() {
        let text = "Would you believe the numbers?\n\nThey are large.\n\nSummary: invest.";
        assert_eq!(strip_follow_up(text), text);
    }

    #[test]
    fn test_single_paragraph_untouched() {
        assert_eq!(strip_follow_up("Would you like more?"), "Would you like more?");
    }

    #[test]
    fn test_strips_question_with_crlf_line_endings() {
        let text = "1. Manual entry\r\n2. Slow approvals\r\n\r\nWould you like me to rank these?\r\n";
        assert_eq!(strip_follow_up(text), "1. Manual entry\n2. Slow approvals");
    }

    #[test]
    fn test_only_last_paragraph_removed() {
        let text = "Body.\n\nDo you agree?\n\nLet me know if anything is missing.";
        assert_eq!(strip_follow_up(text), "Body.\n\nDo you agree?");
    }
}
