//! PhaseForge - conversation-driven product workflow
//!
//! CLI entry point: one-shot commands plus the interactive chat REPL.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use phaseforge::catalog::Catalog;
use phaseforge::cli::{Cli, Command};
use phaseforge::config::Config;
use phaseforge::domain::AgentId;
use phaseforge::llm::{LlmClient, create_client};
use phaseforge::repl::{self, display};
use phaseforge::subscription::LocalSubscription;
use phaseforge::workflow::{ProjectView, Services, Workflow, WorkflowError};

fn setup_logging(verbose: bool) -> Result<()> {
    // Note: Can't log params here since logging isn't initialized yet
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("phaseforge")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };

    let log_file = fs::File::create(log_dir.join("phaseforge.log")).context("Failed to create log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(model = %config.llm.model, tier = %config.subscription.tier, "PhaseForge loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    if let Command::Agents = cli.command {
        return cmd_agents(&config);
    }

    let llm = if cli.command.needs_llm() {
        config.validate()?;
        Some(create_client(&config.llm).map_err(|e| eyre::eyre!("Failed to create LLM client: {}", e))?)
    } else {
        None
    };

    let services = Services::open(&config)?;
    let with_llm = |project: &str| -> Result<Workflow> {
        let llm: Arc<dyn LlmClient> = llm.clone().ok_or_else(|| eyre::eyre!("No LLM client configured"))?;
        Ok(Workflow::new(&services, project, llm))
    };

    let result = match cli.command {
        Command::Agents => Ok(()),
        Command::Status { project } => {
            debug!(%project, "main: matched Status command");
            cmd_status(&ProjectView::new(&services, &project)).await
        }
        Command::Chat { project, agent } => {
            debug!(%project, ?agent, "main: matched Chat command");
            let agent = match agent {
                Some(agent) => agent,
                None => first_active_agent(&ProjectView::new(&services, &project)).await?,
            };
            let llm = llm.clone().ok_or_else(|| eyre::eyre!("No LLM client configured"))?;
            return repl::run_interactive(&services, &project, agent, llm).await;
        }
        Command::Capabilities { project, agent } => {
            debug!(%project, %agent, "main: matched Capabilities command");
            let view = ProjectView::new(&services, &project);
            view.capabilities(agent)
                .await
                .map(|rows| display::print_capabilities(&services.catalog, agent, &rows))
        }
        Command::Analyze {
            project,
            agent,
            capability,
        } => {
            debug!(%project, %agent, %capability, "main: matched Analyze command");
            let workflow = with_llm(&project)?;
            workflow.analyze(agent, &capability).await.map(|record| {
                println!("{}", record.content);
                display::print_analysis(&record);
            })
        }
        Command::Generate {
            project,
            agent,
            instructions,
        } => {
            debug!(%project, %agent, "main: matched Generate command");
            let workflow = with_llm(&project)?;
            workflow
                .generate(agent, instructions.as_deref())
                .await
                .map(|synthesis| display::print_synthesis(&services.catalog, &synthesis))
        }
        Command::Regenerate {
            project,
            agent,
            instructions,
        } => {
            debug!(%project, %agent, "main: matched Regenerate command");
            let workflow = with_llm(&project)?;
            workflow
                .regenerate(agent, &instructions)
                .await
                .map(|synthesis| display::print_synthesis(&services.catalog, &synthesis))
        }
        Command::Reset { project, agent } => {
            debug!(%project, %agent, "main: matched Reset command");
            ProjectView::new(&services, &project)
                .reset(agent)
                .await
                .map(|count| println!("Deleted {} messages for {}.", count, agent))
        }
        Command::History { project, agent } => {
            debug!(%project, %agent, "main: matched History command");
            ProjectView::new(&services, &project)
                .history(agent)
                .await
                .map(|messages| display::print_history(&services.catalog, &messages))
        }
    };

    result.map_err(|e| eyre::eyre!(e.user_message()))
}

/// List agents without touching the store or the model
fn cmd_agents(config: &Config) -> Result<()> {
    debug!("cmd_agents: called");
    let catalog = Catalog::load(config.catalog.path.as_deref()).context("Failed to load workflow catalog")?;
    let subscription = LocalSubscription::new(&config.subscription, &catalog);
    display::print_agents(&catalog, &subscription);
    Ok(())
}

async fn cmd_status(view: &ProjectView) -> Result<(), WorkflowError> {
    debug!(project = %view.project(), "cmd_status: called");
    let status = view.status().await?;
    display::print_status(view.project(), &status);
    Ok(())
}

/// The agent of the first active node, falling back to the first agent
async fn first_active_agent(view: &ProjectView) -> Result<AgentId> {
    let graph = view.graph().await.map_err(|e| eyre::eyre!(e.user_message()))?;
    Ok(graph.current_node().and_then(|n| n.agent).unwrap_or(AgentId::Ba))
}
