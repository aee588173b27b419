//! Phase deliverables and the records that hold them

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The fixed set of deliverable kinds, one per phase or subphase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseType {
    ProjectBrief,
    Prd,
    UxSpec,
    Architecture,
    UserStories,
}

impl PhaseType {
    pub const ALL: [PhaseType; 5] = [
        PhaseType::ProjectBrief,
        PhaseType::Prd,
        PhaseType::UxSpec,
        PhaseType::Architecture,
        PhaseType::UserStories,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectBrief => "project-brief",
            Self::Prd => "prd",
            Self::UxSpec => "ux-spec",
            Self::Architecture => "architecture",
            Self::UserStories => "user-stories",
        }
    }
}

impl std::fmt::Display for PhaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PhaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PhaseType::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("Unknown phase type: {}", s))
    }
}

/// A phase's output
///
/// Heuristic extraction keeps an assistant message verbatim; forced synthesis
/// produces a JSON object keyed by the phase's required sections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Deliverable {
    FormattedText(String),
    Structured(Map<String, Value>),
}

impl Deliverable {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FormattedText(_) => "formatted_text",
            Self::Structured(_) => "structured",
        }
    }

    /// Render as markdown for display or export
    ///
    /// Structured sections are emitted in key order with their keys turned
    /// into headings; nested values are pretty-printed JSON.
    pub fn to_markdown(&self) -> String {
        match self {
            Self::FormattedText(text) => text.clone(),
            Self::Structured(map) => {
                let mut out = String::new();
                for (key, value) in map {
                    out.push_str("## ");
                    out.push_str(&heading(key));
                    out.push_str("\n\n");
                    match value {
                        Value::String(s) => out.push_str(s),
                        Value::Array(items) => {
                            for item in items {
                                match item {
                                    Value::String(s) => out.push_str(&format!("- {}\n", s)),
                                    other => out.push_str(&format!("- {}\n", other)),
                                }
                            }
                        }
                        other => {
                            let pretty = serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string());
                            out.push_str(&pretty);
                        }
                    }
                    out.push_str("\n\n");
                }
                out.trim_end().to_string()
            }
        }
    }
}

/// `success_metrics` / `success-metrics` -> `Success Metrics`
fn heading(key: &str) -> String {
    key.split(['_', '-'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A persisted deliverable for one (project, phase type)
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseRecord {
    pub project: String,
    pub phase_type: PhaseType,
    pub content: Deliverable,
    pub completed: bool,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deliverable_wire_format() {
        let text = Deliverable::FormattedText("# Brief".to_string());
        let value = serde_json::to_value(&text).unwrap();
        assert_eq!(value, json!({"kind": "formatted_text", "value": "# Brief"}));

        let mut map = Map::new();
        map.insert("problem".to_string(), json!("too slow"));
        let structured = Deliverable::Structured(map);
        let value = serde_json::to_value(&structured).unwrap();
        assert_eq!(value, json!({"kind": "structured", "value": {"problem": "too slow"}}));
    }

    #[test]
    fn test_deliverable_rejects_unknown_kind() {
        let result: Result<Deliverable, _> = serde_json::from_value(json!({"kind": "html", "value": "<p/>"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_structured_to_markdown() {
        let mut map = Map::new();
        map.insert("success_metrics".to_string(), json!(["faster", "cheaper"]));
        map.insert("problem".to_string(), json!("Manual reports"));
        let md = Deliverable::Structured(map).to_markdown();
        assert!(md.contains("## Problem\n\nManual reports"));
        assert!(md.contains("## Success Metrics\n\n- faster\n- cheaper"));
    }

    #[test]
    fn test_phase_type_parse() {
        assert_eq!("ux-spec".parse::<PhaseType>().unwrap(), PhaseType::UxSpec);
        assert!("ux_spec".parse::<PhaseType>().is_err());
    }
}
