//! Roundtable - an orchestrator for conversations between AI agents
//!
//! Several agents (ChatGPT, Claude, Gemini) take turns on a theme. A random
//! turn selector never picks the same speaker twice in a row, a usage
//! accumulator prices every reply, and a budget governor warns once and then
//! stops the session at a hard token ceiling.

pub mod agent;
pub mod budget;
pub mod config;
pub mod conversation;
pub mod error;
pub mod pricing;
pub mod providers;
pub mod transcript;
pub mod usage;
pub mod utils;

pub use agent::{Agent, AgentId, AgentReply};
pub use budget::{classify, BudgetConfig, BudgetStatus};
pub use config::Config;
pub use conversation::{ConversationLoop, SessionConfig, SessionReport, SessionStatus};
pub use error::{ProviderError, Result, RoundtableError};
pub use pricing::{Cost, Pricing, PricingTable};
pub use providers::{build_roster, ChatOptions, LLMProvider, LLMResponse, Message, Usage};
pub use transcript::{Transcript, TranscriptSink, Turn};
pub use usage::{UsageAccumulator, UsageState};
