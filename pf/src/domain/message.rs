//! Chat message types

use serde::{Deserialize, Serialize};

use super::AgentId;

/// Who wrote a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("Unknown role: {}", other)),
        }
    }
}

/// A message in one (project, agent) transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,

    /// Store-assigned sequence number; None while the entry is a live,
    /// not yet persisted streaming reply
    pub seq: Option<i64>,

    pub project: String,
    pub agent: AgentId,
    pub role: Role,
    pub content: String,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl Message {
    /// Whether this message has been written to the store
    pub fn is_persisted(&self) -> bool {
        self.seq.is_some()
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
