//! CLI module: command parsing and dispatch
//!
//! All CLI logic lives here. `main.rs` calls `cli::run()`.

pub mod agents;
pub mod common;
pub mod config;
pub mod log;
pub mod run;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "roundtable")]
#[command(version)]
#[command(about = "Watch ChatGPT, Claude and Gemini talk to each other under a token budget", long_about = None)]
struct Cli {
    /// Config file (default: ~/.roundtable/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a conversation
    Run(RunArgs),
    /// List configured agents, their models and prices
    Agents {
        /// Send a tiny request to each agent to check its key
        #[arg(long)]
        probe: bool,
    },
    /// Print the pricing table
    Pricing,
    /// Show a saved session log and verify its totals
    Log {
        /// Path to a `<session>.json` log
        path: PathBuf,
        /// Also print every turn
        #[arg(long)]
        turns: bool,
    },
    /// Show or check configuration
    Config {
        /// Only print the config file path
        #[arg(long)]
        path: bool,
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Show version information
    Version,
}

/// Options for `roundtable run`. Unset options fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Conversation theme
    #[arg(short, long)]
    pub theme: Option<String>,
    /// Token ceiling for the whole session
    #[arg(long, value_name = "TOKENS")]
    pub token_limit: Option<u64>,
    /// Fraction of the ceiling that triggers the warning (0-1)
    #[arg(long, value_name = "FRACTION")]
    pub warning_fraction: Option<f64>,
    /// Seconds to pause between turns
    #[arg(long, value_name = "SECONDS")]
    pub delay: Option<f64>,
    /// Stop after this many turns
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u64>,
    /// Seed the speaker selection
    #[arg(long)]
    pub seed: Option<u64>,
    /// Directory for session logs
    #[arg(long, value_name = "DIR")]
    pub log_dir: Option<PathBuf>,
    /// Do not write session logs
    #[arg(long)]
    pub no_log: bool,
    /// Check every agent with a tiny request before starting
    #[arg(long)]
    pub probe: bool,
    /// Ask for the token ceiling and theme before starting
    #[arg(short, long)]
    pub interactive: bool,
}

#[derive(Subcommand, Debug, Clone, Copy)]
pub enum ConfigAction {
    /// Validate the config file and report unknown fields
    Check,
}

/// Entry point for the CLI: called from main().
pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Load config early so we can respect the logging settings; fall back to
    // defaults if the config file is missing or unreadable.
    let config_path = cli.config.clone().unwrap_or_else(roundtable::Config::path);
    let logging_cfg = roundtable::Config::load_from_path(&config_path)
        .map(|c| c.logging)
        .unwrap_or_default();
    if let Err(e) = roundtable::utils::logging::init_logging(&logging_cfg) {
        eprintln!("Warning: {}", e);
    }

    match cli.command {
        None => {
            let args = RunArgs {
                interactive: true,
                ..Default::default()
            };
            return run::cmd_run(&config_path, args).await;
        }
        Some(Commands::Run(args)) => {
            run::cmd_run(&config_path, args).await?;
        }
        Some(Commands::Agents { probe }) => {
            agents::cmd_agents(&config_path, probe).await?;
        }
        Some(Commands::Pricing) => {
            agents::cmd_pricing(&config_path)?;
        }
        Some(Commands::Log { path, turns }) => {
            log::cmd_log(&path, turns)?;
        }
        Some(Commands::Config { path, action }) => {
            config::cmd_config(&config_path, path, action)?;
        }
        Some(Commands::Version) => {
            cmd_version();
        }
    }

    Ok(())
}

/// Display version information
fn cmd_version() {
    println!("roundtable {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("ChatGPT, Claude and Gemini in one conversation, on a token budget");
}
