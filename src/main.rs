//! tool-agent: run a tool-calling agent from the terminal.
//!
//! Usage:
//!   tool-agent run [TASK]    Run the agent loop on a task
//!   tool-agent tools         List the tools the agent can call
//!   tool-agent init          Write a default config file

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tool_agent::agent::{self, AgentRun};
use tool_agent::config::{self, AgentConfig};
use tool_agent::llm::{InferenceClient, ModelClient};
use tool_agent::tools::ToolRegistry;
use tool_agent::types::*;

const CONFIG_FILE: &str = "agent.toml";

const DEFAULT_TASK: &str = "Help me add 5 + 3 and then tell me about Python programming";

// ---------------------------------------------------------------------------
// CLI definition
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "tool-agent")]
#[command(version)]
#[command(about = "Tool-calling agent runtime")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the agent home directory (default ~/.tool-agent).
    #[arg(long, global = true)]
    home: Option<String>,

    /// Config file (default <home>/agent.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). Overrides the config.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the agent loop on a task.
    Run {
        /// Task for the agent.
        task: Option<String>,

        /// Maximum tool-call turns.
        #[arg(long)]
        max_turns: Option<u32>,

        /// Model to use.
        #[arg(long)]
        model: Option<String>,
    },

    /// List the tools available to the agent.
    Tools,

    /// Write a default config file.
    Init {
        /// Overwrite an existing config.
        #[arg(long)]
        force: bool,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let home_dir = cli
        .home
        .as_deref()
        .map(expand)
        .unwrap_or_else(config::default_home_dir);
    let config_path = cli
        .config
        .as_deref()
        .map(expand)
        .unwrap_or_else(|| home_dir.join(CONFIG_FILE));

    // Process env wins over .env files; dotenvy never overwrites.
    dotenvy::from_filename(".env").ok();
    dotenvy::from_path(home_dir.join(".env")).ok();

    let cfg = match config::load_config(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };

    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            task,
            max_turns,
            model,
        } => cmd_run(cfg, task, max_turns, model).await,
        Commands::Tools => cmd_tools(&cfg),
        Commands::Init { force } => cmd_init(&config_path, force),
    }
}

// ---------------------------------------------------------------------------
// Command implementations
// ---------------------------------------------------------------------------

async fn cmd_run(
    mut cfg: AgentConfig,
    task: Option<String>,
    max_turns: Option<u32>,
    model: Option<String>,
) -> Result<()> {
    if let Err(e) = cfg.apply_env_overrides() {
        exit_with(&e);
    }
    if let Some(max_turns) = max_turns {
        cfg.max_turns = max_turns;
    }
    if let Some(model) = model {
        cfg.model = model;
    }
    if let Err(e) = cfg.validate() {
        exit_with(&e);
    }

    let registry = Arc::new(build_registry(&cfg)?);
    let client: Arc<dyn ModelClient> = Arc::new(InferenceClient::new(
        &cfg.api_base_url,
        &cfg.api_key,
        cfg.request_timeout(),
    )?);
    let task = task.unwrap_or_else(|| DEFAULT_TASK.to_string());

    println!(
        "{} Starting agent '{}' (model: {}, tools: {})",
        ">>>".green().bold(),
        cfg.name,
        cfg.model,
        registry.names().join(", "),
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} Cancelling run...", "<<<".red().bold());
            ctrl_c.cancel();
        }
    });

    let run = agent::run_agent_loop(&cfg, registry, client, &task, cancel)
        .await
        .context("Agent run failed")?;

    print_transcript(&run);
    print_outcome(&run);
    Ok(())
}

fn cmd_tools(cfg: &AgentConfig) -> Result<()> {
    let registry = build_registry(cfg)?;

    println!();
    println!("{}", "=== Tools ===".bold());
    for tool in registry.iter() {
        println!();
        let mut heading = tool.name().bold().to_string();
        if tool.is_terminal() {
            heading.push_str(&format!(" {}", "(terminal)".yellow()));
        }
        if !tool.tags().is_empty() {
            heading.push_str(&format!(" [{}]", tool.tags().join(", ")).dimmed().to_string());
        }
        println!("  {}", heading);
        println!("    {}", tool.description());
        for name in tool.schema().param_names() {
            if let Some(spec) = tool.schema().get(name) {
                let required = if tool.schema().is_required(name) {
                    ""
                } else {
                    " (optional)"
                };
                println!(
                    "    - {}: {}{}  {}",
                    name,
                    spec.ty.as_str(),
                    required,
                    spec.description.as_deref().unwrap_or("").dimmed()
                );
            }
        }
    }
    println!();
    Ok(())
}

fn cmd_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        exit_with(&format!(
            "Config already exists at {}. Use --force to overwrite.",
            config_path.display()
        ));
    }

    config::save_config(&AgentConfig::default(), config_path)?;
    println!(
        "{} Wrote default config to {}",
        ">>>".green().bold(),
        config_path.display()
    );
    println!(
        "    Set {} in the environment or a .env file before running.",
        config::API_KEY_ENV
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn exit_with(err: &dyn Display) -> ! {
    eprintln!("{} {}", "Error:".red().bold(), err);
    std::process::exit(1);
}

/// Built-in tools, restricted by the config's tool filter.
fn build_registry(cfg: &AgentConfig) -> Result<ToolRegistry> {
    let all = ToolRegistry::with_builtin_tools().context("Failed to register built-in tools")?;
    let selected = all.select(&cfg.tools);
    if selected.len() < all.len() {
        info!("Tool filter kept {} of {} tools", selected.len(), all.len());
    }
    Ok(selected)
}

fn print_transcript(run: &AgentRun) {
    println!();
    for message in run.history.iter() {
        match message.role {
            ChatRole::System => {}
            ChatRole::User => println!("{} {}", "User:".cyan().bold(), message.content),
            ChatRole::Assistant => {
                if !message.content.is_empty() {
                    println!("{} {}", "Agent:".green().bold(), message.content);
                }
                for call in &message.tool_calls {
                    println!("  {} {}({})", "->".blue().bold(), call.name, call.arguments);
                }
            }
            ChatRole::Tool => {
                let executed = serde_json::from_str::<Value>(&message.content)
                    .ok()
                    .and_then(|v| v.get("tool_executed").and_then(Value::as_bool))
                    .unwrap_or(false);
                if executed {
                    println!("  {} {}", "<-".green(), message.content.dimmed());
                } else {
                    println!("  {} {}", "<-".red(), message.content);
                }
            }
        }
    }
}

fn print_outcome(run: &AgentRun) {
    println!();
    match &run.state {
        RunState::Completed { .. } => {
            println!("{} Completed after {} turns", "<<<".green().bold(), run.turns)
        }
        RunState::Terminated { result, .. } => {
            println!("{} {} ({})", "<<<".green().bold(), run.state, result)
        }
        RunState::TurnLimitExceeded { turns } => {
            warn!("Run stopped at the turn limit");
            println!(
                "{} Stopped after {} turns without a final answer",
                "<<<".yellow().bold(),
                turns
            )
        }
        RunState::Cancelled => println!("{} Cancelled", "<<<".red().bold()),
    }
    println!(
        "    Tokens: {} prompt, {} completion, {} total",
        run.usage.prompt_tokens, run.usage.completion_tokens, run.usage.total_tokens
    );
}
