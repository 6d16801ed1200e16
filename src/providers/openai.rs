//! OpenAI Provider Implementation
//!
//! This module implements the `LLMProvider` trait for OpenAI's Chat Completions
//! API. It backs the "ChatGPT" agent.
//!
//! # Example
//!
//! ```rust,ignore
//! use roundtable::providers::{openai::OpenAIProvider, ChatOptions, LLMProvider, Message};
//!
//! async fn example() {
//!     let provider = OpenAIProvider::new("your-api-key");
//!     let messages = vec![Message::system("Be brief."), Message::user("Hello!")];
//!     let response = provider
//!         .chat(messages, None, ChatOptions::default())
//!         .await
//!         .unwrap();
//!     println!("ChatGPT: {}", response.content);
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoundtableError};

use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, Message, Role, Usage};

/// The OpenAI API endpoint URL.
const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// The default OpenAI model to use.
pub const DEFAULT_MODEL: &str = "gpt-4o";

// ============================================================================
// OpenAI API Request Types
// ============================================================================

/// OpenAI API request body.
#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

/// A message in OpenAI's format.
#[derive(Debug, Serialize)]
struct OpenAIMessage {
    /// Role: "system", "user" or "assistant"
    role: String,
    content: String,
}

// ============================================================================
// OpenAI API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    /// Text content (may be null for refusals)
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
    #[serde(default)]
    r#type: Option<String>,
}

// ============================================================================
// OpenAI Provider
// ============================================================================

/// OpenAI LLM provider.
pub struct OpenAIProvider {
    /// API key for authentication
    api_key: String,
    /// API base URL
    api_base: String,
    /// HTTP client for making requests
    client: Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use roundtable::providers::openai::OpenAIProvider;
    /// use roundtable::providers::LLMProvider;
    ///
    /// let provider = OpenAIProvider::new("sk-xxx");
    /// assert_eq!(provider.name(), "openai");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, OPENAI_API_URL)
    }

    /// Create a new OpenAI provider with a custom base URL.
    ///
    /// Useful for OpenAI-compatible APIs (Azure, local gateways, etc.).
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    /// Create a new OpenAI provider with a custom HTTP client.
    pub fn with_client(api_key: &str, api_base: &str, client: Client) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client,
        }
    }
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn convert_messages(messages: Vec<Message>) -> Vec<OpenAIMessage> {
    messages
        .into_iter()
        .map(|msg| OpenAIMessage {
            role: match msg.role {
                Role::System => "system",
                Role::User => "user",
                Role::Assistant => "assistant",
            }
            .to_string(),
            content: msg.content,
        })
        .collect()
}

fn convert_response(response: OpenAIResponse) -> LLMResponse {
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .unwrap_or_default();

    let mut llm_response = LLMResponse::text(&content);
    if let Some(usage) = response.usage {
        llm_response =
            llm_response.with_usage(Usage::new(usage.prompt_tokens, usage.completion_tokens));
    }
    llm_response
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for OpenAIProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let request = OpenAIRequest {
            model: model.to_string(),
            messages: convert_messages(messages),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
        };

        debug!("OpenAI request to model {}", model);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();

            let body = match serde_json::from_str::<OpenAIErrorResponse>(&error_text) {
                Ok(err) => format!(
                    "OpenAI API error: {} - {}",
                    err.error.r#type.unwrap_or_else(|| "error".to_string()),
                    err.error.message
                ),
                Err(_) => format!("OpenAI API error: {}", error_text),
            };
            return Err(RoundtableError::from(parse_provider_error(status, &body)));
        }

        let openai_response: OpenAIResponse = response.json().await.map_err(|e| {
            RoundtableError::Provider(format!("Failed to parse OpenAI response: {}", e))
        })?;

        Ok(convert_response(openai_response))
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn name(&self) -> &str {
        "openai"
    }
}

/// Map a transport failure to a typed timeout where possible.
pub(crate) fn classify_transport_error(err: reqwest::Error) -> RoundtableError {
    if err.is_timeout() {
        super::ProviderError::Timeout(err.to_string()).into()
    } else {
        RoundtableError::Http(err)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_provider_creation() {
        let provider = OpenAIProvider::new("test-key");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), "gpt-4o");
        assert_eq!(provider.api_base, "https://api.openai.com/v1");
    }

    #[test]
    fn test_openai_provider_with_base_url() {
        let provider = OpenAIProvider::with_base_url("test-key", "https://custom.api/v1/");
        assert_eq!(provider.api_base, "https://custom.api/v1");
    }

    #[test]
    fn test_convert_messages_roles() {
        let converted = convert_messages(vec![
            Message::system("You are one of three AIs"),
            Message::user("Claude: what about tea?"),
            Message::assistant("Tea is fine."),
        ]);
        assert_eq!(converted.len(), 3);
        assert_eq!(converted[0].role, "system");
        assert_eq!(converted[1].role, "user");
        assert_eq!(converted[2].role, "assistant");
        assert_eq!(converted[2].content, "Tea is fine.");
    }

    #[test]
    fn test_convert_response_with_usage() {
        let response: OpenAIResponse = serde_json::from_str(
            r#"{
                "choices": [{"message": {"role": "assistant", "content": "Hello!"}}],
                "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
            }"#,
        )
        .unwrap();
        let converted = convert_response(response);
        assert_eq!(converted.content, "Hello!");
        assert_eq!(converted.usage, Some(Usage::new(10, 5)));
    }

    #[test]
    fn test_convert_response_empty_choices() {
        let response = OpenAIResponse {
            choices: vec![],
            usage: None,
        };
        let converted = convert_response(response);
        assert_eq!(converted.content, "");
        assert!(converted.usage.is_none());
    }

    #[test]
    fn test_convert_response_null_content() {
        let response: OpenAIResponse =
            serde_json::from_str(r#"{"choices": [{"message": {"content": null}}]}"#).unwrap();
        assert_eq!(convert_response(response).content, "");
    }

    #[test]
    fn test_openai_request_serialization() {
        let request = OpenAIRequest {
            model: "gpt-4o".to_string(),
            messages: convert_messages(vec![Message::user("Hello")]),
            max_tokens: Some(500),
            temperature: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("gpt-4o"));
        assert!(json.contains("max_tokens"));
        assert!(!json.contains("temperature"));
    }

    #[test]
    fn test_openai_error_response_parsing() {
        let err: OpenAIErrorResponse = serde_json::from_str(
            r#"{"error": {"message": "Incorrect API key", "type": "invalid_request_error"}}"#,
        )
        .unwrap();
        assert_eq!(err.error.message, "Incorrect API key");
        assert_eq!(err.error.r#type.as_deref(), Some("invalid_request_error"));
    }
}
