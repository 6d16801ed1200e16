//! `roundtable agents` and `roundtable pricing`.

use std::path::Path;

use anyhow::Result;

use roundtable::providers::{build_roster, find_spec, PROVIDER_REGISTRY};

use super::common::{assemble_agents, load_config, mask_key};

/// List the agents a `run` would start with.
pub(crate) async fn cmd_agents(config_path: &Path, probe: bool) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Providers:");
    for spec in PROVIDER_REGISTRY {
        let key = match spec.name {
            "openai" => config.providers.openai.as_ref(),
            "anthropic" => config.providers.anthropic.as_ref(),
            _ => config.providers.gemini.as_ref(),
        }
        .and_then(|p| p.api_key.as_deref())
        .filter(|k| !k.trim().is_empty());
        match key {
            Some(k) => println!("  {:<10} {:<18} {}", spec.name, spec.env_key, mask_key(k)),
            None => println!("  {:<10} {:<18} (not set)", spec.name, spec.env_key),
        }
    }

    println!("\nAgents:");
    let agents = if probe {
        assemble_agents(&config, true).await?
    } else {
        let roster = build_roster(&config, &config.pricing_table());
        for (provider, reason) in &roster.missing {
            let display = find_spec(provider).map(|s| s.display_name).unwrap_or(*provider);
            println!("  - {} skipped: {}", display, reason);
        }
        roster.agents
    };
    for agent in &agents {
        println!(
            "  {:<10} {:<28} {}",
            agent.id(),
            agent.model(),
            agent.pricing().describe()
        );
    }

    if agents.len() < 2 {
        println!(
            "\nOnly {} agent(s) available; a conversation needs at least 2.",
            agents.len()
        );
    }
    Ok(())
}

/// Print the pricing table with config overrides applied.
pub(crate) fn cmd_pricing(config_path: &Path) -> Result<()> {
    let config = load_config(config_path)?;
    let table = config.pricing_table();

    println!("{:<28} {}", "Model (prefix)", "Price");
    for (model, pricing) in table.entries() {
        println!("{:<28} {}", model, pricing.describe());
    }
    println!("\nUnlisted models are treated as free.");
    Ok(())
}
