//! Console, in-memory and fan-out sinks.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::warn;

use super::{TranscriptSink, Turn};
use crate::budget::BudgetConfig;
use crate::conversation::SessionStatus;
use crate::error::{Result, RoundtableError};
use crate::usage::{usage_percentage, UsageState};

const RULE_WIDTH: usize = 60;

// ============================================================================
// Console
// ============================================================================

/// Prints each turn and a running usage line to stdout.
#[derive(Debug, Clone)]
pub struct ConsoleSink {
    budget: BudgetConfig,
}

impl ConsoleSink {
    pub fn new(budget: BudgetConfig) -> Self {
        Self { budget }
    }

    /// One-line running status, e.g. `Usage: 450/1,000 tokens (45.0%) | $0.0123`.
    pub fn status_line(&self, usage: &UsageState) -> String {
        format!(
            "Usage: {}/{} tokens ({:.1}%) | {}",
            group_thousands(usage.total_tokens()),
            group_thousands(self.budget.token_ceiling),
            usage_percentage(usage, self.budget.token_ceiling),
            usage.total_cost
        )
    }

    pub fn render_turn(&self, turn: &Turn, usage: &UsageState) -> String {
        format!(
            "\n{}:\n{}\n{}\n\nThis turn: {} tokens, {}\n{}\n",
            turn.speaker,
            "-".repeat(RULE_WIDTH),
            turn.text,
            turn.total_tokens(),
            turn.cost,
            self.status_line(usage)
        )
    }
}

#[async_trait]
impl TranscriptSink for ConsoleSink {
    async fn append(&self, turn: &Turn, usage: &UsageState) -> Result<()> {
        println!("{}", self.render_turn(turn, usage));
        Ok(())
    }

    async fn warning(&self, usage: &UsageState) -> Result<()> {
        println!(
            "\nWarning: token usage passed {:.0}% of the budget.\n{}",
            self.budget.warning_fraction * 100.0,
            self.status_line(usage)
        );
        Ok(())
    }

    async fn error(&self, reason: &str) -> Result<()> {
        println!("\nError: {}", reason);
        Ok(())
    }

    async fn finalize(&self, status: SessionStatus, usage: &UsageState) -> Result<()> {
        println!("\nSession ended: {}\n{}", status.describe(), self.status_line(usage));
        Ok(())
    }
}

/// `1234567` -> `1,234,567`.
pub fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

// ============================================================================
// Memory
// ============================================================================

/// An event observed by a [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Turn(Turn),
    Warning(UsageState),
    Error(String),
    Finalized(SessionStatus, UsageState),
}

/// Records every event in memory. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<SinkEvent>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn turns(&self) -> Vec<Turn> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Turn(turn) => Some(turn),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, SinkEvent::Warning(_)))
            .count()
    }

    /// The final status and usage, if the session has ended.
    pub fn finalized(&self) -> Option<(SessionStatus, UsageState)> {
        self.events().into_iter().find_map(|e| match e {
            SinkEvent::Finalized(status, usage) => Some((status, usage)),
            _ => None,
        })
    }

    fn push(&self, event: SinkEvent) -> Result<()> {
        self.events
            .lock()
            .map_err(|_| RoundtableError::Config("memory sink lock poisoned".into()))?
            .push(event);
        Ok(())
    }
}

#[async_trait]
impl TranscriptSink for MemorySink {
    async fn append(&self, turn: &Turn, _usage: &UsageState) -> Result<()> {
        self.push(SinkEvent::Turn(turn.clone()))
    }

    async fn warning(&self, usage: &UsageState) -> Result<()> {
        self.push(SinkEvent::Warning(usage.clone()))
    }

    async fn error(&self, reason: &str) -> Result<()> {
        self.push(SinkEvent::Error(reason.to_string()))
    }

    async fn finalize(&self, status: SessionStatus, usage: &UsageState) -> Result<()> {
        self.push(SinkEvent::Finalized(status, usage.clone()))
    }
}

// ============================================================================
// Fan-out
// ============================================================================

/// Forwards every event to several sinks.
///
/// Every sink sees every event even if an earlier one fails; the first
/// failure is returned.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Box<dyn TranscriptSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl TranscriptSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }

    pub fn push(&mut self, sink: Box<dyn TranscriptSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

fn keep_first(first: &mut Option<RoundtableError>, result: Result<()>) {
    if let Err(e) = result {
        if first.is_some() {
            warn!(error = %e, "Additional sink failure");
        } else {
            *first = Some(e);
        }
    }
}

fn into_result(first: Option<RoundtableError>) -> Result<()> {
    match first {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[async_trait]
impl TranscriptSink for FanoutSink {
    async fn append(&self, turn: &Turn, usage: &UsageState) -> Result<()> {
        let mut first = None;
        for sink in &self.sinks {
            keep_first(&mut first, sink.append(turn, usage).await);
        }
        into_result(first)
    }

    async fn warning(&self, usage: &UsageState) -> Result<()> {
        let mut first = None;
        for sink in &self.sinks {
            keep_first(&mut first, sink.warning(usage).await);
        }
        into_result(first)
    }

    async fn error(&self, reason: &str) -> Result<()> {
        let mut first = None;
        for sink in &self.sinks {
            keep_first(&mut first, sink.error(reason).await);
        }
        into_result(first)
    }

    async fn finalize(&self, status: SessionStatus, usage: &UsageState) -> Result<()> {
        let mut first = None;
        for sink in &self.sinks {
            keep_first(&mut first, sink.finalize(status, usage).await);
        }
        into_result(first)
    }
}
