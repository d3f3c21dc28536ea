//! Corax CLI - phase-gated autonomous penetration testing
//!
//! Usage:
//!   corax serve                   Run the HTTP API
//!   corax ask <question>          Ask the agent a question
//!   corax approve --decision ...  Respond to a pending phase transition
//!   corax sessions list           List sessions
//!   corax sessions clear          Clear one session
//!   corax init                    Write the default config file

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use corax_agent::{LlmClient, Model};
use corax_core::{
    format_todo_list, AgentResult, ApprovalDecision, CoraxConfig, SessionKey, ToolPolicy,
};
use corax_orchestrator::{InMemorySessionStore, Orchestrator};
use corax_tools::ToolExecutor;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "corax")]
#[command(author, version, about = "Phase-gated autonomous penetration-testing assistant")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Bind address, overriding the configured one
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Ask the agent a question
    Ask {
        /// The question or objective
        question: String,

        /// User identifier
        #[arg(long, default_value = "local")]
        user: String,

        /// Project identifier
        #[arg(long, default_value = "default")]
        project: String,

        /// Session identifier for conversation continuity
        #[arg(long, default_value = "session-001")]
        session: String,
    },

    /// Respond to a pending phase transition request
    Approve {
        /// Decision (approve, modify, abort)
        #[arg(long)]
        decision: String,

        /// Revised instructions when the decision is modify
        #[arg(long)]
        modification: Option<String>,

        /// User identifier
        #[arg(long, default_value = "local")]
        user: String,

        /// Project identifier
        #[arg(long, default_value = "default")]
        project: String,

        /// Session identifier
        #[arg(long, default_value = "session-001")]
        session: String,
    },

    /// Session management
    Sessions {
        #[command(subcommand)]
        action: SessionCommands,
    },

    /// Write the default configuration file
    Init {
        /// Target directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    /// List sessions for a user and project
    List {
        #[arg(long, default_value = "local")]
        user: String,

        #[arg(long, default_value = "default")]
        project: String,
    },

    /// Clear one session
    Clear {
        #[arg(long)]
        session: String,

        #[arg(long, default_value = "local")]
        user: String,

        #[arg(long, default_value = "default")]
        project: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Serve { bind } => cmd_serve(bind).await,
        Commands::Ask {
            question,
            user,
            project,
            session,
        } => cmd_ask(question, user, project, session).await,
        Commands::Approve {
            decision,
            modification,
            user,
            project,
            session,
        } => cmd_approve(decision, modification, user, project, session).await,
        Commands::Sessions { action } => cmd_sessions(action).await,
        Commands::Init { path } => cmd_init(path),
    }
}

/// Wire the orchestrator from configuration
///
/// Tool backends are external collaborators; register them on the executor
/// when embedding. Unregistered tools come back as failed results the agent
/// reasons about.
fn build_orchestrator(config: CoraxConfig) -> Result<Orchestrator> {
    let model: Model = config
        .models
        .default
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let llm = LlmClient::new(model)
        .with_max_tokens(config.models.max_tokens)
        .with_api_key_env(config.models.api_key_env.as_str());
    let tools = ToolExecutor::new(ToolPolicy::default());

    Ok(Orchestrator::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(llm),
        tools,
        config,
    ))
}

async fn cmd_serve(bind: Option<String>) -> Result<()> {
    let config = CoraxConfig::load_or_default(Path::new("."))
        .context("Failed to load configuration")?;
    let addr = bind.unwrap_or_else(|| config.api.bind_addr.clone());
    let orchestrator = Arc::new(build_orchestrator(config)?);

    info!("Corax API listening on {}", addr);
    corax_api::serve(orchestrator, &addr).await
}

async fn cmd_ask(question: String, user: String, project: String, session: String) -> Result<()> {
    let config = CoraxConfig::load_or_default(Path::new("."))
        .context("Failed to load configuration")?;
    let orchestrator = build_orchestrator(config)?;
    let key = SessionKey::new(user, project, session);

    info!("Asking as {}", key);
    let result = orchestrator.invoke(&key, &question).await?;
    print_result(&result);
    Ok(())
}

async fn cmd_approve(
    decision: String,
    modification: Option<String>,
    user: String,
    project: String,
    session: String,
) -> Result<()> {
    let decision: ApprovalDecision = decision.parse().map_err(|e: String| anyhow::anyhow!(e))?;
    let config = CoraxConfig::load_or_default(Path::new("."))
        .context("Failed to load configuration")?;
    let orchestrator = build_orchestrator(config)?;
    let key = SessionKey::new(user, project, session);

    let result = orchestrator
        .resume_after_approval(&key, decision, modification)
        .await?;
    print_result(&result);
    Ok(())
}

async fn cmd_sessions(action: SessionCommands) -> Result<()> {
    let config = CoraxConfig::load_or_default(Path::new("."))
        .context("Failed to load configuration")?;
    let orchestrator = build_orchestrator(config)?;

    match action {
        SessionCommands::List { user, project } => {
            let sessions = orchestrator.list_sessions(&user, &project).await?;
            if sessions.is_empty() {
                println!("No sessions for {}/{}", user, project);
            } else {
                for id in sessions {
                    println!("{}", id);
                }
            }
        }
        SessionCommands::Clear {
            session,
            user,
            project,
        } => {
            let key = SessionKey::new(user, project, session);
            if orchestrator.clear_session(&key).await? {
                println!("Cleared {}", key);
            } else {
                println!("No session {}", key);
            }
        }
    }
    Ok(())
}

fn cmd_init(path: PathBuf) -> Result<()> {
    CoraxConfig::write_default(&path).context("Failed to write default configuration")?;
    println!("Wrote {}", path.join(".corax/config.toml").display());
    Ok(())
}

fn print_result(result: &AgentResult) {
    println!("{}", result.answer);

    if result.awaiting_approval {
        println!();
        println!("Session paused. Respond with: corax approve --decision approve|modify|abort");
    }

    println!();
    println!(
        "phase: {} | iterations: {} | tokens: {}",
        result.current_phase,
        result.iteration_count,
        result.usage.total()
    );
    if let Some(tool) = &result.tool_used {
        println!("last tool: {}", tool);
    }
    if !result.todo_list.is_empty() {
        println!();
        println!("{}", format_todo_list(&result.todo_list));
    }
}
