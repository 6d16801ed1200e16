//! `roundtable run`: set up and drive one conversation.

use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use roundtable::config::Config;
use roundtable::conversation::{ConversationLoop, SessionConfig, SessionReport, SessionStatus};
use roundtable::error::RoundtableError;
use roundtable::transcript::{
    group_thousands, ConsoleSink, FanoutSink, RosterEntry, SessionLogSink, SessionMeta,
};

use super::common::{assemble_agents, load_config, prompt};
use super::RunArgs;

const RULE: &str = "============================================================";

pub(crate) async fn cmd_run(config_path: &Path, args: RunArgs) -> Result<()> {
    let mut config = load_config(config_path)?;
    apply_run_args(&mut config, &args);
    if args.interactive {
        interactive_setup(&mut config)?;
    }
    config.validate().context("Invalid configuration")?;

    println!("{}", RULE);
    println!("Roundtable");
    println!("Theme: {}", config.conversation.theme);
    println!(
        "Token limit: {}",
        group_thousands(config.budget.token_ceiling)
    );
    println!("{}", RULE);
    println!("\nPreparing agents...");

    let agents = assemble_agents(&config, args.probe).await?;
    if agents.len() < 2 {
        return Err(RoundtableError::InsufficientAgents {
            available: agents.len(),
        })
        .context("Set at least two of OPENAI_API_KEY, ANTHROPIC_API_KEY, GOOGLE_API_KEY");
    }
    let names: Vec<String> = agents.iter().map(|a| a.id().to_string()).collect();
    println!("Participants: {}", names.join(", "));

    let session_config = SessionConfig::from(&config);
    let mut sink = FanoutSink::new();
    if config.transcript.console {
        sink = sink.with(ConsoleSink::new(session_config.budget));
    }
    let mut log_paths = None;
    if config.transcript.enabled && !args.no_log {
        let roster: Vec<RosterEntry> = agents.iter().map(RosterEntry::from).collect();
        let meta = SessionMeta::new(&session_config.theme, session_config.budget, roster);
        let dir = args
            .log_dir
            .clone()
            .unwrap_or_else(|| config.transcript_dir());
        let log_sink = SessionLogSink::create(&dir, meta)
            .await
            .with_context(|| format!("Failed to create session log in {}", dir.display()))?;
        log_paths = Some((
            log_sink.text_path().to_path_buf(),
            log_sink.json_path().to_path_buf(),
        ));
        sink = sink.with(log_sink);
    }

    let session = ConversationLoop::new(agents, session_config, Box::new(sink))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, stopping after the current turn");
            println!("\nStopping after the current turn...");
            let _ = stop_tx.send(true);
        }
    });

    println!("\nConversation starting. Press Ctrl+C to stop.\n{}", RULE);
    let started = Instant::now();
    let report = session.run(stop_rx).await;

    print_report(&report, started.elapsed().as_secs_f64() / 60.0);
    if let Some((text, json)) = log_paths {
        println!("\nLogs saved:");
        println!("  {}", text.display());
        println!("  {}", json.display());
    }

    if report.status == SessionStatus::StoppedError {
        bail!(
            "Conversation stopped by an error: {}",
            report.error.unwrap_or_default()
        );
    }
    Ok(())
}

/// Command-line flags win over the config file.
fn apply_run_args(config: &mut Config, args: &RunArgs) {
    if let Some(theme) = &args.theme {
        config.conversation.theme = theme.clone();
    }
    if let Some(limit) = args.token_limit {
        config.budget.token_ceiling = limit;
    }
    if let Some(fraction) = args.warning_fraction {
        config.budget.warning_fraction = fraction;
    }
    if let Some(delay) = args.delay {
        config.conversation.turn_delay_secs = delay;
    }
    if args.max_turns.is_some() {
        config.conversation.max_turns = args.max_turns;
    }
    if args.seed.is_some() {
        config.conversation.seed = args.seed;
    }
}

fn interactive_setup(config: &mut Config) -> Result<()> {
    println!("Roundtable setup");
    println!("{}", "=".repeat(50));

    loop {
        println!("\nChoose a token limit:");
        println!("1. 20,000 tokens (recommended)");
        println!("2. 50,000 tokens");
        println!("3. Custom");
        match prompt("Choice (1-3): ")?.as_str() {
            "1" => {
                config.budget.token_ceiling = 20_000;
                break;
            }
            "2" => {
                config.budget.token_ceiling = 50_000;
                break;
            }
            "3" => match prompt("Token count: ")?.parse::<u64>() {
                Ok(n) if n > 0 => {
                    config.budget.token_ceiling = n;
                    break;
                }
                _ => println!("Please enter a positive whole number"),
            },
            _ => println!("Please enter 1, 2 or 3"),
        }
    }

    println!("\nChoose a conversation theme.");
    println!("e.g. a debate about philosophy, science fiction, inventing a recipe");
    let theme = prompt("Theme (blank for default): ")?;
    if !theme.is_empty() {
        config.conversation.theme = theme;
    }
    Ok(())
}

fn print_report(report: &SessionReport, minutes: f64) {
    let usage = &report.usage;
    println!("\n{}", RULE);
    println!("Conversation finished");
    println!("{}", RULE);
    println!("Status: {}", report.status.describe());
    if let Some(error) = &report.error {
        println!("Reason: {}", error);
    }
    println!("Turns: {}", report.turns.len());
    println!("Duration: {:.1} min", minutes);
    println!(
        "Tokens: {} (input {}, output {})",
        group_thousands(usage.total_tokens()),
        group_thousands(usage.total_input_tokens),
        group_thousands(usage.total_output_tokens)
    );
    println!("Cost: {}", usage.total_cost);

    if !usage.per_agent.is_empty() {
        println!("\nPer agent:");
        for (agent, stats) in &usage.per_agent {
            if stats.turns == 0 {
                continue;
            }
            println!(
                "  {}: {} turns, {} tokens ({})",
                agent,
                stats.turns,
                group_thousands(stats.total_tokens()),
                stats.cost
            );
        }
    }

    if report.status == SessionStatus::StoppedBudget {
        warn!("Session ended at the token ceiling");
    }
}
