//! Shared CLI helpers used across multiple command handlers.

use std::io::{self, BufRead, Write};
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use roundtable::agent::Agent;
use roundtable::config::Config;
use roundtable::providers::build_roster;

/// Read a line from stdin, trimming whitespace.
pub(crate) fn read_line() -> Result<String> {
    let mut input = String::new();
    let read = io::stdin()
        .lock()
        .read_line(&mut input)
        .with_context(|| "Failed to read input")?;
    if read == 0 {
        anyhow::bail!("No input: stdin is closed");
    }
    Ok(input.trim().to_string())
}

/// Print `label` without a newline and read the answer.
pub(crate) fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush().with_context(|| "Failed to flush stdout")?;
    read_line()
}

/// Load `.env`, then the config file with environment overrides.
pub(crate) fn load_config(path: &Path) -> Result<Config> {
    match dotenvy::dotenv() {
        Ok(env_path) => info!(path = %env_path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => warn!(error = %e, "Failed to load .env"),
    }
    let config = Config::load_from_path(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    Ok(config)
}

/// Show the first and last four characters of a secret.
pub(crate) fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Build the roster, report missing keys and optionally probe each agent.
///
/// Agents whose probe fails are left out.
pub(crate) async fn assemble_agents(config: &Config, probe: bool) -> Result<Vec<Agent>> {
    let roster = build_roster(config, &config.pricing_table());
    for (provider, reason) in &roster.missing {
        println!("  - {} skipped: {}", provider, reason);
    }

    if !probe {
        return Ok(roster.agents);
    }

    let mut ready = Vec::with_capacity(roster.agents.len());
    for agent in roster.agents {
        print!("  Testing {}... ", agent.id());
        io::stdout().flush().ok();
        match agent.probe().await {
            Ok(()) => {
                println!("ok");
                ready.push(agent);
            }
            Err(e) => {
                println!("failed");
                warn!(agent = %agent.id(), error = %e, "Probe failed, agent dropped");
            }
        }
    }
    Ok(ready)
}
