//! `roundtable log`: inspect a saved session.

use std::path::Path;

use anyhow::{Context, Result};

use roundtable::transcript::SessionLog;

pub(crate) fn cmd_log(path: &Path, show_turns: bool) -> Result<()> {
    let log = SessionLog::load(path)
        .with_context(|| format!("Failed to load session log {}", path.display()))?;

    print!("{}", log.summary());

    if show_turns {
        println!();
        for turn in &log.turns {
            println!(
                "[{}] {} ({} tokens, {})",
                turn.sequence,
                turn.speaker,
                turn.total_tokens(),
                turn.cost
            );
            println!("{}\n", turn.text);
        }
    }

    match log.verify() {
        Ok(()) => println!("\n[OK] Totals match the recorded turns"),
        Err(e) => {
            println!("\n[ERROR] {}", e);
            anyhow::bail!("Session log failed verification");
        }
    }
    Ok(())
}
