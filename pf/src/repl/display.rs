//! Terminal rendering shared by the REPL and the one-shot commands

use colored::{ColoredString, Colorize};

use crate::capability::CapabilityStatus;
use crate::catalog::Catalog;
use crate::domain::{AgentId, AnalysisRecord, Message, Role};
use crate::phase::{NodeAccess, NodeStatus};
use crate::subscription::Subscription;
use crate::synthesis::Synthesis;
use crate::workflow::ProjectStatus;

fn status_label(access: &NodeAccess) -> ColoredString {
    if access.tier_locked {
        return "upgrade".magenta();
    }
    match access.status {
        NodeStatus::Locked => "locked".dimmed(),
        NodeStatus::Active => "active".bright_green(),
        NodeStatus::Completed => "completed".cyan(),
    }
}

pub fn print_agents(catalog: &Catalog, subscription: &dyn Subscription) {
    println!("{}", "Agents:".bright_cyan());
    for binding in catalog.bindings_in_order() {
        let def = catalog.agent(binding.agent);
        let plan = if subscription.can_use_agent(binding.agent) {
            String::new()
        } else {
            format!(" (requires {})", def.min_tier).magenta().to_string()
        };
        println!(
            "  {:10} {} the {} -> {}{}",
            binding.agent.as_str().yellow(),
            def.name.bright_white(),
            def.title,
            binding.phase_type,
            plan
        );
    }
}

pub fn print_status(project: &str, status: &ProjectStatus) {
    println!();
    println!("{} {}", "Project:".bright_cyan(), project.bright_white());
    for node in status.graph.nodes() {
        let indent = if node.parent.is_some() { "    " } else { "  " };
        let row = node
            .agent
            .and_then(|agent| status.agents.iter().find(|a| a.agent == agent));
        match row {
            Some(row) => {
                let ready = if row.can_generate && row.access.status == NodeStatus::Active {
                    " ready to generate".bright_green().to_string()
                } else {
                    String::new()
                };
                println!(
                    "{}{:24} {:10} {} ({} messages){}",
                    indent,
                    node.title,
                    status_label(&row.access),
                    row.name,
                    row.message_count,
                    ready
                );
            }
            None => {
                let access = NodeAccess {
                    status: node.status,
                    tier_locked: false,
                };
                println!("{}{:24} {}", indent, node.title.bold(), status_label(&access));
            }
        }
    }
    if status.graph.is_complete() {
        println!("{}", "All phases completed.".bright_green());
    }
    println!();
}

pub fn print_capabilities(catalog: &Catalog, agent: AgentId, rows: &[CapabilityStatus]) {
    println!();
    println!("{} {}", "Capabilities for".bright_cyan(), catalog.agent(agent).name.bright_white());
    for row in rows {
        let state = if row.completed {
            "done".cyan()
        } else if row.unlocked {
            "ready".bright_green()
        } else {
            format!("{:>3}%", row.progress).dimmed()
        };
        let blocked = row
            .blocked_by
            .as_ref()
            .map(|dep| format!(" needs {}", dep).yellow().to_string())
            .unwrap_or_default();
        println!("  {:24} {:6} {}{}", row.id.yellow(), state, row.title, blocked);
    }
    println!();
}

pub fn print_history(catalog: &Catalog, messages: &[Message]) {
    if messages.is_empty() {
        println!("{}", "No conversation history.".dimmed());
        return;
    }
    println!();
    for message in messages {
        let speaker = match message.role {
            Role::User => "You".bright_blue(),
            Role::Assistant => catalog.agent(message.agent).name.bright_magenta(),
        };
        let when = chrono::DateTime::from_timestamp_millis(message.created_at)
            .map(|t| t.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} {}", speaker, when.dimmed());
        println!("{}", message.content);
        println!();
    }
}

pub fn print_analysis(record: &AnalysisRecord) {
    println!();
    println!("{} {}", "Analysis saved:".bright_green(), record.capability_id.yellow());
}

pub fn print_synthesis(catalog: &Catalog, synthesis: &Synthesis) {
    let title = &catalog.profile(synthesis.record.phase_type).document_title;
    println!();
    println!("{} ({})", title.bright_cyan().bold(), synthesis.source.to_string().dimmed());
    println!();
    println!("{}", synthesis.record.content.to_markdown());
    println!();
    match &synthesis.graph {
        Some(graph) => match graph.current_node() {
            Some(next) => println!("{} {}", "Next:".bright_cyan(), next.title),
            None if graph.is_complete() => println!("{}", "All phases completed.".bright_green()),
            None => {}
        },
        None => println!("{}", "Saved. Run status to see phase progress.".dimmed()),
    }
}

pub fn print_error(message: &str) {
    println!("{} {}", "Error:".red(), message);
}
