//! Persisted session logs.
//!
//! Each session writes two files into the log directory:
//! - `<session>.json`: the full [`SessionLog`], rewritten after every event
//! - `<session>.txt`: a human-readable transcript, appended per turn

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use super::sinks::group_thousands;
use super::{TranscriptSink, Turn};
use crate::agent::{Agent, AgentId};
use crate::budget::BudgetConfig;
use crate::conversation::SessionStatus;
use crate::error::{Result, RoundtableError};
use crate::pricing::Pricing;
use crate::usage::UsageState;

const TEXT_RULE: usize = 50;
const TEXT_FRAME: usize = 80;

/// Snapshot of one roster member as it was configured for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub id: AgentId,
    pub provider: String,
    pub model: String,
    pub pricing: Pricing,
}

impl From<&Agent> for RosterEntry {
    fn from(agent: &Agent) -> Self {
        Self {
            id: agent.id().clone(),
            provider: agent.provider_name().to_string(),
            model: agent.model().to_string(),
            pricing: agent.pricing(),
        }
    }
}

/// Everything known about a session before its first turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    /// Unique per session even when two start within the same second.
    pub id: Uuid,
    pub name: String,
    pub theme: String,
    pub budget: BudgetConfig,
    pub roster: Vec<RosterEntry>,
    pub started_at: DateTime<Utc>,
}

impl SessionMeta {
    /// Session named after the local start time, `conversation_YYYYmmdd_HHMMSS`.
    pub fn new(theme: &str, budget: BudgetConfig, roster: Vec<RosterEntry>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: Local::now().format("conversation_%Y%m%d_%H%M%S").to_string(),
            theme: theme.to_string(),
            budget,
            roster,
            started_at: Utc::now(),
        }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// The JSON document persisted for a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionLog {
    #[serde(flatten)]
    pub meta: SessionMeta,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    /// Sequence of the turn that crossed the warning threshold.
    #[serde(default)]
    pub warned_at: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    pub turns: Vec<Turn>,
    pub usage: UsageState,
}

impl SessionLog {
    pub fn new(meta: SessionMeta) -> Self {
        Self {
            meta,
            ended_at: None,
            status: SessionStatus::Running,
            warned_at: None,
            error: None,
            turns: Vec::new(),
            usage: UsageState::default(),
        }
    }

    /// Read a log written by [`SessionLog::save`] or [`SessionLogSink`].
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RoundtableError::NotFound(format!(
                "session log {}",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write the log as pretty JSON, replacing the file atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = tmp_path(path);
        std::fs::write(&tmp, serde_json::to_string_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    async fn save_async(&self, path: &Path) -> Result<()> {
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, serde_json::to_string_pretty(self)?).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }

    /// Check that the stored usage matches a replay of the stored turns and
    /// that turn sequences are contiguous with no speaker repeating.
    pub fn verify(&self) -> Result<()> {
        for (i, turn) in self.turns.iter().enumerate() {
            let expected = i as u64 + 1;
            if turn.sequence != expected {
                return Err(RoundtableError::Config(format!(
                    "turn {} has sequence {}",
                    expected, turn.sequence
                )));
            }
        }
        if let Some(pair) = self
            .turns
            .windows(2)
            .find(|pair| pair[0].speaker == pair[1].speaker)
        {
            return Err(RoundtableError::Config(format!(
                "{} spoke twice in a row at turn {}",
                pair[1].speaker, pair[1].sequence
            )));
        }
        let replayed = UsageState::replay(&self.turns);
        if !replayed.same_totals(&self.usage) {
            return Err(RoundtableError::Config(format!(
                "stored usage ({} tokens, {}) does not match turns ({} tokens, {})",
                self.usage.total_tokens(),
                self.usage.total_cost,
                replayed.total_tokens(),
                replayed.total_cost
            )));
        }
        Ok(())
    }

    /// Wall-clock minutes from start to end (or to the last turn).
    pub fn duration_minutes(&self) -> f64 {
        let end = self
            .ended_at
            .or_else(|| self.turns.last().map(|t| t.timestamp))
            .unwrap_or(self.meta.started_at);
        (end - self.meta.started_at).num_milliseconds().max(0) as f64 / 60_000.0
    }

    /// Multi-line statistics block shared by the CLI and the text log.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Session:   {}\nTheme:     {}\nStatus:    {}\nTurns:     {}\nTokens:    {} / {}\nCost:      {}\nDuration:  {:.1} min\n",
            self.meta.name,
            self.meta.theme,
            self.status.describe(),
            self.turns.len(),
            group_thousands(self.usage.total_tokens()),
            group_thousands(self.meta.budget.token_ceiling),
            self.usage.total_cost,
            self.duration_minutes()
        );
        for (id, usage) in &self.usage.per_agent {
            out.push_str(&format!(
                "  {:<10} {:>3} turns  {:>8} tokens  {}\n",
                id.as_str(),
                usage.turns,
                group_thousands(usage.total_tokens()),
                usage.cost
            ));
        }
        if let Some(reason) = &self.error {
            out.push_str(&format!("Error:     {}\n", reason));
        }
        out
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn local_stamp(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Sink that keeps `<dir>/<session>.json` and `<dir>/<session>.txt` current.
pub struct SessionLogSink {
    json_path: PathBuf,
    text_path: PathBuf,
    log: Mutex<SessionLog>,
}

impl SessionLogSink {
    /// Create the log directory and both files, recording the session setup.
    pub async fn create(dir: &Path, meta: SessionMeta) -> Result<Self> {
        tokio::fs::create_dir_all(dir).await?;
        let json_path = dir.join(format!("{}.json", meta.name));
        let text_path = dir.join(format!("{}.txt", meta.name));

        let participants: Vec<&str> = meta.roster.iter().map(|r| r.id.as_str()).collect();
        let header = format!(
            "=== Conversation started: {} ===\nTheme: {}\nToken limit: {}\nParticipants: {}\n\n",
            local_stamp(meta.started_at),
            meta.theme,
            group_thousands(meta.budget.token_ceiling),
            participants.join(", ")
        );
        tokio::fs::write(&text_path, header).await?;

        let log = SessionLog::new(meta);
        log.save_async(&json_path).await?;
        debug!(path = %json_path.display(), "Session log created");

        Ok(Self {
            json_path,
            text_path,
            log: Mutex::new(log),
        })
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn text_path(&self) -> &Path {
        &self.text_path
    }

    /// Copy of the log as currently persisted.
    pub async fn snapshot(&self) -> SessionLog {
        self.log.lock().await.clone()
    }

    async fn append_text(&self, text: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.text_path)
            .await?;
        file.write_all(text.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl TranscriptSink for SessionLogSink {
    async fn append(&self, turn: &Turn, usage: &UsageState) -> Result<()> {
        {
            let mut log = self.log.lock().await;
            log.turns.push(turn.clone());
            log.usage = usage.clone();
            log.save_async(&self.json_path).await?;
        }
        self.append_text(&format!(
            "[{}] #{} {}\n{}\n{}\n\nTokens: {}, Cost: {}\n{}\n\n",
            local_stamp(turn.timestamp),
            turn.sequence,
            turn.speaker,
            "-".repeat(TEXT_RULE),
            turn.text,
            turn.total_tokens(),
            turn.cost,
            "=".repeat(TEXT_FRAME)
        ))
        .await
    }

    async fn warning(&self, usage: &UsageState) -> Result<()> {
        let mut log = self.log.lock().await;
        log.status = SessionStatus::Warned;
        log.warned_at = log.turns.last().map(|t| t.sequence);
        log.usage = usage.clone();
        log.save_async(&self.json_path).await
    }

    async fn error(&self, reason: &str) -> Result<()> {
        {
            let mut log = self.log.lock().await;
            log.error = Some(reason.to_string());
            log.save_async(&self.json_path).await?;
        }
        self.append_text(&format!("Error: {}\n\n", reason)).await
    }

    async fn finalize(&self, status: SessionStatus, usage: &UsageState) -> Result<()> {
        let summary = {
            let mut log = self.log.lock().await;
            log.status = status;
            log.usage = usage.clone();
            log.ended_at = Some(Utc::now());
            log.save_async(&self.json_path).await?;
            log.summary()
        };
        self.append_text(&format!(
            "=== Conversation ended: {} ===\n{}",
            local_stamp(Utc::now()),
            summary
        ))
        .await
    }
}
