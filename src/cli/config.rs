//! `roundtable config`: show or check configuration.

use std::path::Path;

use anyhow::{Context, Result};

use roundtable::config::validate::{validate_config, DiagnosticLevel};

use super::common::{load_config, mask_key};
use super::ConfigAction;

pub(crate) fn cmd_config(
    config_path: &Path,
    path_only: bool,
    action: Option<ConfigAction>,
) -> Result<()> {
    if path_only {
        println!("{}", config_path.display());
        return Ok(());
    }
    match action {
        Some(ConfigAction::Check) => cmd_check(config_path),
        None => cmd_show(config_path),
    }
}

/// Print the effective configuration with API keys masked.
fn cmd_show(config_path: &Path) -> Result<()> {
    let mut config = load_config(config_path)?;
    for provider in [
        &mut config.providers.openai,
        &mut config.providers.anthropic,
        &mut config.providers.gemini,
    ]
    .into_iter()
    .flatten()
    {
        if let Some(key) = provider.api_key.as_mut() {
            *key = mask_key(key);
        }
    }

    println!("# {}", config_path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Validate configuration file.
fn cmd_check(config_path: &Path) -> Result<()> {
    println!("Config file: {}", config_path.display());

    if !config_path.exists() {
        println!("[OK] No config file found (using defaults)");
        return Ok(());
    }

    let content = std::fs::read_to_string(config_path).context("Failed to read config file")?;

    let raw: serde_json::Value = match serde_json::from_str(&content) {
        Ok(v) => v,
        Err(e) => {
            println!("[ERROR] Invalid JSON: {}", e);
            return Ok(());
        }
    };

    let diagnostics = validate_config(&raw);
    for diag in &diagnostics {
        println!("{}", diag);
    }

    let errors = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Error)
        .count();
    let warnings = diagnostics
        .iter()
        .filter(|d| d.level == DiagnosticLevel::Warn)
        .count();

    if errors == 0 && warnings == 0 {
        println!("\nConfiguration looks good!");
    } else {
        println!("\nFound {} error(s), {} warning(s)", errors, warnings);
    }
    Ok(())
}
