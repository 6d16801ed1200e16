//! Providers module - LLM providers (OpenAI, Anthropic, Google)
//!
//! This module defines the `LLMProvider` trait and common types for
//! interacting with the chat APIs that back each agent. Each provider
//! implements the `LLMProvider` trait to provide a consistent interface.
//!
//! # Example
//!
//! ```rust,ignore
//! use roundtable::providers::{ChatOptions, LLMProvider, Message};
//! use roundtable::providers::claude::ClaudeProvider;
//!
//! async fn example() {
//!     let provider = ClaudeProvider::new("your-api-key");
//!     let messages = vec![Message::user("Hello!")];
//!     let options = ChatOptions::new().with_max_tokens(500);
//!
//!     let response = provider.chat(messages, None, options).await.unwrap();
//!     println!("Response: {}", response.content);
//! }
//! ```

pub mod claude;
pub mod gemini;
pub mod openai;
mod registry;
mod types;

use crate::error::ProviderError;

pub use claude::ClaudeProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAIProvider;
pub use registry::{build_roster, find_spec, ProviderSpec, Roster, PROVIDER_REGISTRY};
pub use types::{ChatOptions, LLMProvider, LLMResponse, Message, Role, Usage};

/// Parse an HTTP status code and response body into a structured [`ProviderError`].
///
/// This centralizes the mapping from HTTP status codes to error classifications
/// so that every provider produces consistent typed errors.
pub fn parse_provider_error(status: u16, body: &str) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Auth(body.to_string()),
        402 => ProviderError::Billing(body.to_string()),
        404 => ProviderError::ModelNotFound(body.to_string()),
        429 => ProviderError::RateLimit(body.to_string()),
        400 => ProviderError::InvalidRequest(body.to_string()),
        503 | 529 => ProviderError::Overloaded(body.to_string()),
        500..=599 => ProviderError::ServerError(body.to_string()),
        _ => ProviderError::Unknown(format!("HTTP {}: {}", status, body)),
    }
}
