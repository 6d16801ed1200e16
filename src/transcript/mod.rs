//! Transcript module - the ordered record of a conversation
//!
//! This module provides:
//! - [`Turn`]: one immutable utterance with its token usage and cost
//! - [`Transcript`]: the append-only sequence of turns owned by a session
//! - [`TranscriptSink`]: where turns and session events are reported
//! - Sink implementations for the console, files and memory
//!
//! # Example
//!
//! ```
//! use roundtable::agent::AgentId;
//! use roundtable::pricing::Cost;
//! use roundtable::transcript::Transcript;
//!
//! let mut transcript = Transcript::new();
//! let turn = transcript.push(AgentId::new("Claude"), "Hello!".into(), 12, 3, Cost::ZERO);
//! assert_eq!(turn.sequence, 1);
//! assert_eq!(transcript.last_speaker().map(|id| id.as_str()), Some("Claude"));
//! ```

mod log;
mod sinks;

pub use log::{RosterEntry, SessionLog, SessionLogSink, SessionMeta};
pub use sinks::{group_thousands, ConsoleSink, FanoutSink, MemorySink, SinkEvent};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::conversation::SessionStatus;
use crate::error::Result;
use crate::pricing::Cost;
use crate::usage::UsageState;

/// One completed agent utterance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    /// 1-based position in the conversation.
    pub sequence: u64,
    pub speaker: AgentId,
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Incremental cost of this turn.
    pub cost: Cost,
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Append-only list of turns in conversational order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<Turn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new turn, assigning the next sequence number and the current time.
    pub fn push(
        &mut self,
        speaker: AgentId,
        text: String,
        input_tokens: u64,
        output_tokens: u64,
        cost: Cost,
    ) -> &Turn {
        let sequence = self.turns.len() as u64 + 1;
        self.turns.push(Turn {
            sequence,
            speaker,
            text,
            input_tokens,
            output_tokens,
            cost,
            timestamp: Utc::now(),
        });
        &self.turns[self.turns.len() - 1]
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last_speaker(&self) -> Option<&AgentId> {
        self.turns.last().map(|t| &t.speaker)
    }

    pub fn into_turns(self) -> Vec<Turn> {
        self.turns
    }
}

/// Receives the observable events of a session.
///
/// Sink failures are logged by the caller and never stop the conversation.
#[async_trait]
pub trait TranscriptSink: Send + Sync {
    /// A turn was recorded. `usage` already includes it.
    async fn append(&self, turn: &Turn, usage: &UsageState) -> Result<()>;

    /// Usage crossed the warning threshold. Called at most once per session.
    async fn warning(&self, usage: &UsageState) -> Result<()>;

    /// An agent invocation failed; the session is about to stop.
    async fn error(&self, reason: &str) -> Result<()>;

    /// The session reached a terminal status. Called exactly once.
    async fn finalize(&self, status: SessionStatus, usage: &UsageState) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_assigns_contiguous_sequences() {
        let mut transcript = Transcript::new();
        for name in ["A", "B", "A"] {
            transcript.push(AgentId::new(name), "x".into(), 1, 1, Cost::ZERO);
        }
        let seqs: Vec<u64> = transcript.turns().iter().map(|t| t.sequence).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.last_speaker(), Some(&AgentId::new("A")));
    }

    #[test]
    fn test_timestamps_are_non_decreasing() {
        let mut transcript = Transcript::new();
        transcript.push(AgentId::new("A"), "1".into(), 0, 0, Cost::ZERO);
        transcript.push(AgentId::new("B"), "2".into(), 0, 0, Cost::ZERO);
        let turns = transcript.turns();
        assert!(turns[0].timestamp <= turns[1].timestamp);
    }

    #[test]
    fn test_empty_transcript() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());
        assert!(transcript.last_speaker().is_none());
    }

    #[test]
    fn test_turn_serialization() {
        let mut transcript = Transcript::new();
        transcript.push(AgentId::new("Claude"), "hi".into(), 10, 2, Cost::from_nanos(60_000));
        let json = serde_json::to_value(&transcript).unwrap();
        assert!(json.is_array());
        assert_eq!(json[0]["speaker"], "Claude");
        assert_eq!(json[0]["cost"], 60_000);
        assert_eq!(json[0]["sequence"], 1);

        let restored: Transcript = serde_json::from_value(json).unwrap();
        assert_eq!(restored, transcript);
    }
}
