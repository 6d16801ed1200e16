//! Configuration type definitions for Roundtable
//!
//! This module defines all configuration structs used by the CLI and the
//! conversation loop. All types implement serde traits for JSON
//! serialization and have sensible defaults.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::budget::BudgetConfig;
use crate::pricing::PriceOverride;

/// Main configuration struct for Roundtable
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// LLM provider credentials and endpoints
    pub providers: ProvidersConfig,
    /// Which agents take part and how they call their models
    pub agents: AgentsConfig,
    /// Token ceiling and warning fraction
    pub budget: BudgetConfig,
    /// Theme, pacing and turn limits
    pub conversation: ConversationConfig,
    /// Where transcripts go
    pub transcript: TranscriptConfig,
    /// Tracing subscriber setup
    pub logging: LoggingConfig,
    /// Per-model price overrides, keyed by model name or prefix.
    pub pricing: HashMap<String, PriceOverride>,
}

// ============================================================================
// Provider Configurations
// ============================================================================

/// All LLM provider configurations
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersConfig {
    /// OpenAI configuration
    pub openai: Option<ProviderConfig>,
    /// Anthropic Claude configuration
    pub anthropic: Option<ProviderConfig>,
    /// Google Gemini configuration
    pub gemini: Option<ProviderConfig>,
}

/// Generic provider configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ProviderConfig {
    /// API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,
    /// Custom API base URL
    #[serde(default)]
    pub api_base: Option<String>,
}

// ============================================================================
// Agent Configurations
// ============================================================================

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AgentsConfig {
    /// Settings shared by every agent
    pub defaults: AgentDefaults,
    pub openai: AgentEntry,
    pub anthropic: AgentEntry,
    pub gemini: AgentEntry,
}

/// Default agent settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentDefaults {
    /// Maximum tokens for each reply
    pub max_tokens: u32,
    /// Temperature for generation
    pub temperature: f32,
    /// Replies longer than this many characters are cut. 0 = no cap.
    pub max_response_chars: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.7,
            max_response_chars: crate::agent::DEFAULT_MAX_RESPONSE_CHARS,
        }
    }
}

/// Per-agent switches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentEntry {
    /// Set to false to leave this agent out even when its key is present.
    pub enabled: bool,
    /// Display name; defaults to the provider's usual name.
    pub name: Option<String>,
    /// Model override; defaults to the provider's default model.
    pub model: Option<String>,
}

impl Default for AgentEntry {
    fn default() -> Self {
        Self {
            enabled: true,
            name: None,
            model: None,
        }
    }
}

// ============================================================================
// Conversation / Transcript Configurations
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConversationConfig {
    /// What the agents talk about.
    pub theme: String,
    /// Pause between turns, in seconds.
    pub turn_delay_secs: f64,
    /// How many recent turns each prompt includes.
    pub history_window: usize,
    /// Stop after this many turns. None = run until the budget is spent.
    pub max_turns: Option<u64>,
    /// Seed for speaker selection, for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            theme: crate::conversation::session::DEFAULT_THEME.to_string(),
            turn_delay_secs: 2.0,
            history_window: crate::conversation::DEFAULT_HISTORY_WINDOW,
            max_turns: None,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TranscriptConfig {
    /// Write `<name>.txt` and `<name>.json` session logs.
    pub enabled: bool,
    /// Directory for session logs.
    pub dir: String,
    /// Print turns and usage to stdout.
    pub console: bool,
}

impl Default for TranscriptConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: "logs".to_string(),
            console: true,
        }
    }
}

// ============================================================================
// Logging Configuration
// ============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, coloured
    Pretty,
    /// Compact single-line text with a `component` field
    #[default]
    Component,
    /// JSON lines
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
    /// Append logs to this file instead of stderr.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            level: "info".to_string(),
            file: None,
        }
    }
}
