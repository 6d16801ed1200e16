//! Conversation module - turn-taking, prompt context and the session loop
//!
//! A session runs as a small state machine:
//!
//! ```text
//! Running ──(usage ≥ warning threshold)──▶ Warned
//!    │                                       │
//!    ├──────────(usage ≥ ceiling)────────────┼──▶ StoppedBudget
//!    ├──────────(stop requested)─────────────┼──▶ StoppedManual
//!    └──────────(agent call failed)──────────┴──▶ StoppedError
//! ```
//!
//! The three `Stopped*` states are terminal.

pub mod context;
pub mod selector;
pub mod session;

pub use context::{ContextBuilder, PromptContext, DEFAULT_HISTORY_WINDOW};
pub use selector::{select_next, TurnSelector};
pub use session::{ConversationLoop, SessionConfig};

use serde::{Deserialize, Serialize};

use crate::transcript::Turn;
use crate::usage::UsageState;

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    /// Still running, the one-time budget warning has been issued.
    Warned,
    StoppedBudget,
    StoppedManual,
    StoppedError,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::StoppedBudget | SessionStatus::StoppedManual | SessionStatus::StoppedError
        )
    }

    pub fn describe(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Warned => "running (budget warning issued)",
            SessionStatus::StoppedBudget => "stopped: token budget reached",
            SessionStatus::StoppedManual => "stopped: manual stop",
            SessionStatus::StoppedError => "stopped: agent error",
        }
    }
}

/// Outcome of a finished session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub turns: Vec<Turn>,
    pub usage: UsageState,
    /// Sequence of the turn that triggered the budget warning, if any.
    pub warned_at: Option<u64>,
    /// Why the session stopped with an error.
    pub error: Option<String>,
}
