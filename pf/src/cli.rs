//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::AgentId;

/// PhaseForge - conversation-driven product workflow
#[derive(Parser)]
#[command(
    name = "pf",
    about = "Guide an idea through discovery, planning, architecture and delivery with AI agents",
    version
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// List agents and the phase each one drives
    Agents,

    /// Show phase progress for a project
    Status {
        #[arg(short, long)]
        project: String,
    },

    /// Chat with an agent interactively
    Chat {
        #[arg(short, long)]
        project: String,

        /// Agent to start with (defaults to the first active phase)
        #[arg(short, long)]
        agent: Option<AgentId>,
    },

    /// Show capability unlock progress for an agent
    Capabilities {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,
    },

    /// Run an unlocked capability
    Analyze {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,

        #[arg(short = 'k', long)]
        capability: String,
    },

    /// Generate the agent's phase document
    Generate {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,

        /// Extra instructions; skips extraction from the conversation
        #[arg(short, long)]
        instructions: Option<String>,
    },

    /// Rebuild the agent's phase document with new instructions
    Regenerate {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,

        #[arg(short, long)]
        instructions: String,
    },

    /// Delete an agent's conversation
    Reset {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,
    },

    /// Print an agent's conversation
    History {
        #[arg(short, long)]
        project: String,

        #[arg(short, long)]
        agent: AgentId,
    },
}

impl Command {
    /// Whether the command calls the model and needs an API key
    pub fn needs_llm(&self) -> bool {
        matches!(
            self,
            Command::Chat { .. } | Command::Analyze { .. } | Command::Generate { .. } | Command::Regenerate { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_agents() {
        let cli = Cli::try_parse_from(["pf", "agents"]).unwrap();
        assert!(matches!(cli.command, Command::Agents));
        assert!(!cli.verbose);
        assert!(!cli.command.needs_llm());
    }

    #[test]
    fn test_parse_generate_with_instructions() {
        let cli = Cli::try_parse_from([
            "pf",
            "generate",
            "--project",
            "acme",
            "--agent",
            "architect",
            "-i",
            "keep it short",
        ])
        .unwrap();
        match cli.command {
            Command::Generate {
                project,
                agent,
                instructions,
            } => {
                assert_eq!(project, "acme");
                assert_eq!(agent, AgentId::Architect);
                assert_eq!(instructions.as_deref(), Some("keep it short"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["pf", "status", "-p", "acme", "-v", "--config", "/tmp/pf.yml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/pf.yml")));
    }

    #[test]
    fn test_analyze_requires_capability() {
        assert!(Cli::try_parse_from(["pf", "analyze", "-p", "acme", "-a", "ba"]).is_err());
        let cli = Cli::try_parse_from(["pf", "analyze", "-p", "acme", "-a", "ba", "-k", "pain-points"]).unwrap();
        assert!(cli.command.needs_llm());
    }

    #[test]
    fn test_unknown_agent_rejected() {
        assert!(Cli::try_parse_from(["pf", "history", "-p", "acme", "-a", "cfo"]).is_err());
    }

    #[test]
    fn test_regenerate_requires_instructions() {
        assert!(Cli::try_parse_from(["pf", "regenerate", "-p", "acme", "-a", "pm"]).is_err());
    }
}
