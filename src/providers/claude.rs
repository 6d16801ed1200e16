//! Claude (Anthropic) LLM provider implementation
//!
//! This module implements the `LLMProvider` trait for Anthropic's Messages
//! API, handling message conversion and response parsing.
//!
//! # Example
//!
//! ```rust,ignore
//! use roundtable::providers::{claude::ClaudeProvider, ChatOptions, LLMProvider, Message};
//!
//! async fn example() {
//!     let provider = ClaudeProvider::new("your-api-key");
//!
//!     let messages = vec![
//!         Message::system("You are one of three AIs in a conversation."),
//!         Message::user("Hello!"),
//!     ];
//!
//!     let response = provider
//!         .chat(messages, None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!
//!     println!("Claude: {}", response.content);
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoundtableError};

use super::openai::classify_transport_error;
use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, Message, Role, Usage};

/// The Claude API endpoint URL.
const CLAUDE_API_URL: &str = "https://api.anthropic.com/v1/messages";

/// The default Claude model to use.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// The Anthropic API version header value.
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// `max_tokens` is mandatory for the Messages API.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Claude/Anthropic LLM provider.
///
/// Implements the `LLMProvider` trait for Anthropic's Claude API.
pub struct ClaudeProvider {
    /// API key for authentication
    api_key: String,
    /// Messages endpoint
    api_url: String,
    /// HTTP client for making requests
    client: Client,
}

impl ClaudeProvider {
    /// Create a new Claude provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use roundtable::providers::claude::ClaudeProvider;
    /// use roundtable::providers::LLMProvider;
    ///
    /// let provider = ClaudeProvider::new("sk-ant-api03-xxx");
    /// assert_eq!(provider.name(), "anthropic");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_url: CLAUDE_API_URL.to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a new Claude provider against a different Messages endpoint.
    pub fn with_api_url(api_key: &str, api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            ..Self::new(api_key)
        }
    }

    /// Create a new Claude provider with a custom HTTP client.
    ///
    /// This is useful for testing or when you need custom client configuration
    /// (e.g., custom timeouts, proxies).
    pub fn with_client(api_key: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_url: CLAUDE_API_URL.to_string(),
            client,
        }
    }
}

#[async_trait]
impl LLMProvider for ClaudeProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(DEFAULT_MODEL);

        // Claude takes the system prompt as a separate field
        let (system, claude_messages) = convert_messages(messages);

        let request = ClaudeRequest {
            model: model.to_string(),
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: claude_messages,
            system,
            temperature: options.temperature,
        };

        debug!("Claude request to model {}", model);

        let response = self
            .client
            .post(&self.api_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();

            // Build a human-readable body for the typed error
            let body = if let Ok(error_response) =
                serde_json::from_str::<ClaudeErrorResponse>(&error_text)
            {
                format!(
                    "Claude API error: {} - {}",
                    error_response.error.r#type, error_response.error.message
                )
            } else {
                format!("Claude API error: {}", error_text)
            };

            return Err(RoundtableError::from(parse_provider_error(status, &body)));
        }

        let claude_response: ClaudeResponse = response.json().await.map_err(|e| {
            RoundtableError::Provider(format!("Failed to parse Claude response: {}", e))
        })?;
        Ok(convert_response(claude_response))
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}

// ============================================================================
// Claude API Request Types
// ============================================================================

/// Claude API request body.
#[derive(Debug, Serialize)]
struct ClaudeRequest {
    /// Model identifier
    model: String,
    /// Maximum tokens to generate
    max_tokens: u32,
    /// Conversation messages (excluding system)
    messages: Vec<ClaudeMessage>,
    /// System prompt (separate from messages in Claude API)
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    /// Temperature for sampling
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in Claude's format.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct ClaudeMessage {
    /// Role: "user" or "assistant"
    role: &'static str,
    content: String,
}

// ============================================================================
// Claude API Response Types
// ============================================================================

/// Claude API response body.
#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    /// Response content blocks
    content: Vec<ClaudeContentBlock>,
    /// Token usage
    usage: Option<ClaudeUsage>,
}

/// A content block within a response. Only text blocks carry conversation.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClaudeContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Claude API error response.
#[derive(Debug, Deserialize)]
struct ClaudeErrorResponse {
    error: ClaudeError,
}

/// Claude API error details.
#[derive(Debug, Deserialize)]
struct ClaudeError {
    r#type: String,
    message: String,
}

/// Claude token usage.
#[derive(Debug, Deserialize)]
struct ClaudeUsage {
    /// Tokens in the input
    input_tokens: u32,
    /// Tokens in the output
    output_tokens: u32,
}

// ============================================================================
// Conversion Functions
// ============================================================================

/// Convert Roundtable messages to Claude API format.
///
/// System messages are extracted (the last one wins). Consecutive messages
/// with the same role are merged, since several other agents may speak in a
/// row and the Messages API expects alternating roles.
fn convert_messages(messages: Vec<Message>) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system: Option<String> = None;
    let mut claude_messages: Vec<ClaudeMessage> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system = Some(msg.content);
                continue;
            }
            Role::User => "user",
            Role::Assistant => "assistant",
        };

        match claude_messages.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&msg.content);
            }
            _ => claude_messages.push(ClaudeMessage {
                role,
                content: msg.content,
            }),
        }
    }

    (system, claude_messages)
}

/// Convert Claude API response to an `LLMResponse`.
fn convert_response(response: ClaudeResponse) -> LLMResponse {
    let mut content = String::new();

    for block in response.content {
        if let ClaudeContentBlock::Text { text } = block {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&text);
        }
    }

    let mut llm_response = LLMResponse::text(&content);
    if let Some(usage) = response.usage {
        llm_response = llm_response.with_usage(Usage::new(usage.input_tokens, usage.output_tokens));
    }
    llm_response
}

// ============================================================================
// Tests
// ============================================================================
