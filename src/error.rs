//! Error types for Roundtable
//!
//! This module defines all error types used by the conversation core and its
//! collaborators. Uses `thiserror` for ergonomic error handling with automatic
//! `Display` and `Error` trait implementations.
//!
//! Budget exhaustion and manual stops are *not* errors: they are terminal
//! [`SessionStatus`](crate::conversation::SessionStatus) values.

use std::fmt;
use thiserror::Error;

// ============================================================================
// Provider Error Classification
// ============================================================================

/// Structured provider error classification.
///
/// Fine-grained categorization of LLM provider HTTP errors, so an operator can
/// tell a rejected key from an exhausted quota in the session log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// 401/403: Invalid API key or authentication failure
    Auth(String),
    /// 429: Rate limit or quota exceeded
    RateLimit(String),
    /// 402: Payment required or billing issue
    Billing(String),
    /// 500/502/504: Server-side errors
    ServerError(String),
    /// 400: Bad request, invalid JSON, malformed parameters
    InvalidRequest(String),
    /// 404: Model not found or endpoint not available
    ModelNotFound(String),
    /// Connection or read timeout
    Timeout(String),
    /// 503 / provider reports overload
    Overloaded(String),
    /// Catch-all for unrecognized errors
    Unknown(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Auth(msg) => write!(f, "Authentication error: {}", msg),
            ProviderError::RateLimit(msg) => write!(f, "Rate limit error: {}", msg),
            ProviderError::Billing(msg) => write!(f, "Billing error: {}", msg),
            ProviderError::ServerError(msg) => write!(f, "Server error: {}", msg),
            ProviderError::InvalidRequest(msg) => write!(f, "Invalid request: {}", msg),
            ProviderError::ModelNotFound(msg) => write!(f, "Model not found: {}", msg),
            ProviderError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            ProviderError::Overloaded(msg) => write!(f, "Overloaded error: {}", msg),
            ProviderError::Unknown(msg) => write!(f, "Unknown provider error: {}", msg),
        }
    }
}

impl ProviderError {
    /// Returns `true` if the failure is likely transient.
    ///
    /// The conversation core never retries; this only feeds the log line and
    /// the CLI hint printed after a `StoppedError` session.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimit(_)
                | ProviderError::ServerError(_)
                | ProviderError::Timeout(_)
                | ProviderError::Overloaded(_)
        )
    }

    /// Returns the HTTP status code associated with this error, if applicable.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ProviderError::Auth(_) => Some(401),
            ProviderError::RateLimit(_) => Some(429),
            ProviderError::Billing(_) => Some(402),
            ProviderError::ServerError(_) => Some(500),
            ProviderError::InvalidRequest(_) => Some(400),
            ProviderError::ModelNotFound(_) => Some(404),
            ProviderError::Overloaded(_) => Some(503),
            ProviderError::Timeout(_) | ProviderError::Unknown(_) => None,
        }
    }
}

impl From<ProviderError> for RoundtableError {
    fn from(err: ProviderError) -> Self {
        RoundtableError::ProviderTyped(err)
    }
}

// ============================================================================
// Primary Error Type
// ============================================================================

/// The primary error type for Roundtable operations.
#[derive(Error, Debug)]
pub enum RoundtableError {
    /// Fewer than two usable agents at session start.
    #[error("Insufficient agents: a conversation needs at least 2, found {available}")]
    InsufficientAgents { available: usize },

    /// An agent call failed. Fatal to the session, never retried by the core.
    #[error("Agent {agent} failed: {source}")]
    Invocation {
        agent: String,
        #[source]
        source: Box<RoundtableError>,
    },

    /// Configuration-related errors (invalid budget, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Untyped provider errors (malformed responses, client construction).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Structured provider error derived from the HTTP status.
    #[error("Provider error: {0}")]
    ProviderTyped(ProviderError),

    /// Unknown agent, missing session log, etc.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Standard I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl RoundtableError {
    /// Wrap an error raised while invoking `agent`.
    pub fn invocation(agent: &str, source: RoundtableError) -> Self {
        RoundtableError::Invocation {
            agent: agent.to_string(),
            source: Box::new(source),
        }
    }

    /// The typed provider classification, looking through `Invocation`.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            RoundtableError::ProviderTyped(err) => Some(err),
            RoundtableError::Invocation { source, .. } => source.provider_error(),
            _ => None,
        }
    }
}

/// A specialized `Result` type for Roundtable operations.
pub type Result<T> = std::result::Result<T, RoundtableError>;
