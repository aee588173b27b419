//! Agent identifiers and subscription tiers

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One of the five fixed conversational personas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentId {
    /// Business analyst - discovery and project brief
    Ba,
    /// Product manager - PRD
    Pm,
    /// UX designer - UX specification
    Ux,
    /// Architect - technical architecture
    Architect,
    /// Scrum master - user stories
    Sm,
}

impl AgentId {
    /// Every agent in workflow order
    pub const ALL: [AgentId; 5] = [AgentId::Ba, AgentId::Pm, AgentId::Ux, AgentId::Architect, AgentId::Sm];

    /// Stable identifier used in storage and on the command line
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ba => "ba",
            Self::Pm => "pm",
            Self::Ux => "ux",
            Self::Architect => "architect",
            Self::Sm => "sm",
        }
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for AgentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "AgentId::from_str: called");
        match s.trim().to_lowercase().as_str() {
            "ba" => Ok(Self::Ba),
            "pm" => Ok(Self::Pm),
            "ux" => Ok(Self::Ux),
            "architect" => Ok(Self::Architect),
            "sm" => Ok(Self::Sm),
            other => Err(format!("Unknown agent: {}. Use: ba, pm, ux, architect, sm", other)),
        }
    }
}

/// Subscription tier, ordered from least to most capable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Starter,
    Pro,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Starter => write!(f, "starter"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

impl std::str::FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "starter" => Ok(Self::Starter),
            "pro" => Ok(Self::Pro),
            other => Err(format!("Unknown tier: {}. Use: free, starter, pro", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_round_trips_through_str() {
        for agent in AgentId::ALL {
            assert_eq!(agent.as_str().parse::<AgentId>().unwrap(), agent);
        }
        assert!("qa".parse::<AgentId>().is_err());
    }

    #[test]
    fn test_agent_serde_matches_as_str() {
        let json = serde_json::to_string(&AgentId::Architect).unwrap();
        assert_eq!(json, "\"architect\"");
    }

    #[test]
    fn test_tier_ordering() {
        assert!(Tier::Free < Tier::Starter);
        assert!(Tier::Starter < Tier::Pro);
        assert_eq!("PRO".parse::<Tier>().unwrap(), Tier::Pro);
    }
}
