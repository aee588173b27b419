//! REPL session state and main loop

use std::future::Future;
use std::io::{self, Write};

use colored::Colorize;
use eyre::Result;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::broadcast;
use tracing::debug;

use super::command::SlashCommand;
use super::display;
use super::intro::IntroductionGuard;
use crate::domain::AgentId;
use crate::session::SessionEvent;
use crate::workflow::{Workflow, WorkflowError};

/// Result of handling a slash command
enum SlashResult {
    Continue,
    Quit,
}

/// Interactive chat over one project
pub struct ReplSession {
    workflow: Workflow,
    intro: IntroductionGuard,
}

impl ReplSession {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            intro: IntroductionGuard::new(),
        }
    }

    fn agent(&self) -> AgentId {
        self.workflow.session().current_agent()
    }

    /// Run the REPL main loop
    pub async fn run(&mut self, initial_agent: AgentId) -> Result<()> {
        self.print_welcome();
        self.switch_agent(initial_agent).await;

        let mut rl = DefaultEditor::new().map_err(|e| eyre::eyre!("Failed to initialize readline: {}", e))?;

        loop {
            let prompt = format!("{} ", format!("{}>", self.agent()).bright_green());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let input = line.trim();
                    if input.is_empty() {
                        continue;
                    }
                    let _ = rl.add_history_entry(input);

                    if input.starts_with('/') {
                        match self.handle_slash_command(SlashCommand::parse(input)).await {
                            SlashResult::Continue => continue,
                            SlashResult::Quit => break,
                        }
                    } else {
                        self.chat(input).await;
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    break;
                }
                Err(err) => {
                    return Err(eyre::eyre!("Readline error: {}", err));
                }
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome(&self) {
        println!();
        println!("{}", "PhaseForge".bright_cyan().bold());
        println!("Project: {}", self.workflow.view().project());
        println!("Type {} for help, {} to quit", "/help".yellow(), "/quit".yellow());
        println!();
    }

    async fn handle_slash_command(&mut self, command: SlashCommand) -> SlashResult {
        debug!(?command, "handle_slash_command: called");
        let result = match command {
            SlashCommand::Help => {
                self.print_help();
                Ok(())
            }
            SlashCommand::Quit => return SlashResult::Quit,
            SlashCommand::Agent(None) => {
                println!("Usage: {} <{}>", "/agent".yellow(), agent_list());
                Ok(())
            }
            SlashCommand::Agent(Some(id)) => {
                match id.parse::<AgentId>() {
                    Ok(agent) => self.switch_agent(agent).await,
                    Err(e) => display::print_error(&e),
                }
                Ok(())
            }
            SlashCommand::Status => self.show_status().await,
            SlashCommand::Caps => self.show_capabilities().await,
            SlashCommand::Analyze(None) => {
                println!("Usage: {} <capability>", "/analyze".yellow());
                Ok(())
            }
            SlashCommand::Analyze(Some(id)) => self.analyze(&id).await,
            SlashCommand::Generate(instructions) => self.generate(instructions.as_deref()).await,
            SlashCommand::Regenerate(None) => {
                println!("Usage: {} <instructions>", "/regenerate".yellow());
                Ok(())
            }
            SlashCommand::Regenerate(Some(instructions)) => self.regenerate(&instructions).await,
            SlashCommand::Reset => self.reset().await,
            SlashCommand::History => {
                let snapshot = self.workflow.session().snapshot();
                display::print_history(self.workflow.view().catalog(), &snapshot.messages);
                Ok(())
            }
            SlashCommand::Unknown(cmd) => {
                println!("{} Unknown command: {}", "?".yellow(), cmd);
                println!("Type {} for available commands", "/help".yellow());
                Ok(())
            }
        };

        if let Err(e) = result {
            display::print_error(&e.user_message());
        }
        SlashResult::Continue
    }

    fn print_help(&self) {
        println!();
        println!("{}", "Available Commands:".bright_cyan());
        println!("  {:20} Show this help", "/help".yellow());
        println!("  {:20} Exit the REPL", "/quit".yellow());
        println!("  {:20} Switch to another agent", "/agent <id>".yellow());
        println!("  {:20} Show phase progress", "/status".yellow());
        println!("  {:20} Show capabilities for this agent", "/caps".yellow());
        println!("  {:20} Run an unlocked capability", "/analyze <id>".yellow());
        println!("  {:20} Generate this phase's document", "/generate [text]".yellow());
        println!("  {:20} Rebuild the document with instructions", "/regenerate <text>".yellow());
        println!("  {:20} Delete this agent's conversation", "/reset".yellow());
        println!("  {:20} Show the conversation", "/history".yellow());
        println!();
    }

    /// Select an agent, load its transcript and introduce it if empty
    async fn switch_agent(&mut self, agent: AgentId) {
        if let Err(e) = self.workflow.select_agent(agent).await {
            display::print_error(&e.user_message());
            return;
        }
        let def = self.workflow.view().catalog().agent(agent);
        println!("{} {} the {}", "Now talking to".dimmed(), def.name.bright_white(), def.title);

        let snapshot = self.workflow.session().snapshot();
        display::print_history(self.workflow.view().catalog(), &snapshot.messages);
        self.introduce_if_needed(agent).await;
    }

    async fn introduce_if_needed(&mut self, agent: AgentId) {
        let count = match self.workflow.view().history(agent).await {
            Ok(messages) => messages.len() as u64,
            Err(e) => {
                display::print_error(&e.user_message());
                return;
            }
        };
        if !self.intro.should_introduce(agent, count) {
            return;
        }
        self.intro.mark(agent);
        let events = self.workflow.session().subscribe();
        let result = stream_reply(agent, events, self.workflow.introduce(agent)).await;
        if let Err(e) = result {
            display::print_error(&e.user_message());
        }
    }

    async fn chat(&mut self, input: &str) {
        let agent = self.agent();
        let events = self.workflow.session().subscribe();
        if let Err(e) = stream_reply(agent, events, self.workflow.chat(agent, input)).await {
            display::print_error(&e.user_message());
        }
    }

    async fn show_status(&self) -> Result<(), WorkflowError> {
        let status = self.workflow.view().status().await?;
        display::print_status(self.workflow.view().project(), &status);
        Ok(())
    }

    async fn show_capabilities(&self) -> Result<(), WorkflowError> {
        let agent = self.agent();
        let rows = self.workflow.view().capabilities(agent).await?;
        display::print_capabilities(self.workflow.view().catalog(), agent, &rows);
        Ok(())
    }

    async fn analyze(&self, capability_id: &str) -> Result<(), WorkflowError> {
        let agent = self.agent();
        let events = self.workflow.session().subscribe();
        let record = stream_reply(agent, events, self.workflow.analyze(agent, capability_id)).await?;
        display::print_analysis(&record);
        Ok(())
    }

    async fn generate(&self, instructions: Option<&str>) -> Result<(), WorkflowError> {
        println!("{}", "Generating document...".dimmed());
        let synthesis = self.workflow.generate(self.agent(), instructions).await?;
        display::print_synthesis(self.workflow.view().catalog(), &synthesis);
        Ok(())
    }

    async fn regenerate(&self, instructions: &str) -> Result<(), WorkflowError> {
        println!("{}", "Regenerating document...".dimmed());
        let synthesis = self.workflow.regenerate(self.agent(), instructions).await?;
        display::print_synthesis(self.workflow.view().catalog(), &synthesis);
        Ok(())
    }

    async fn reset(&mut self) -> Result<(), WorkflowError> {
        let agent = self.agent();
        let count = self.workflow.reset(agent).await?;
        self.intro.clear(agent);
        println!("{}", format!("Deleted {} messages.", count).dimmed());
        self.introduce_if_needed(agent).await;
        Ok(())
    }
}

/// Print `agent`'s streamed text while `work` runs
async fn stream_reply<T>(
    agent: AgentId,
    mut events: broadcast::Receiver<SessionEvent>,
    work: impl Future<Output = Result<T, WorkflowError>>,
) -> Result<T, WorkflowError> {
    let printer = tokio::spawn(async move {
        let mut printed = false;
        loop {
            match events.recv().await {
                Ok(SessionEvent::Delta { agent: a, text }) if a == agent => {
                    print!("{}", text);
                    let _ = io::stdout().flush();
                    printed = true;
                }
                Ok(SessionEvent::Completed { agent: a, .. }) | Ok(SessionEvent::Failed { agent: a, .. }) if a == agent => {
                    break;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        if printed {
            println!();
            println!();
        }
    });

    let result = work.await;
    if result.is_err() {
        // Gate and lock errors are raised before any send, so no Failed event follows
        printer.abort();
    }
    let _ = printer.await;
    result
}

fn agent_list() -> String {
    AgentId::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>().join("|")
}
