//! Gemini (Google) LLM provider implementation
//!
//! Implements the `LLMProvider` trait for the Generative Language API's
//! `generateContent` endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, RoundtableError};

use super::openai::classify_transport_error;
use super::{parse_provider_error, ChatOptions, LLMProvider, LLMResponse, Message, Role, Usage};

/// The Generative Language API base URL.
const GEMINI_API_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// The default Gemini model to use.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Gemini LLM provider.
pub struct GeminiProvider {
    api_key: String,
    api_base: String,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the given API key.
    ///
    /// # Example
    /// ```
    /// use roundtable::providers::gemini::GeminiProvider;
    /// use roundtable::providers::LLMProvider;
    ///
    /// let provider = GeminiProvider::new("AIza-xxx");
    /// assert_eq!(provider.name(), "gemini");
    /// ```
    pub fn new(api_key: &str) -> Self {
        Self::with_base_url(api_key, GEMINI_API_URL)
    }

    /// Create a new Gemini provider with a custom base URL.
    pub fn with_base_url(api_key: &str, api_base: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_base: api_base.trim_end_matches('/').to_string(),
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(120))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.api_base, model)
    }
}

// ============================================================================
// Gemini API Request Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    /// "user" or "model"; absent for the system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

// ============================================================================
// Gemini API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorResponse {
    error: GeminiError,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
    #[serde(default)]
    status: Option<String>,
}

// ============================================================================
// Conversion Functions
// ============================================================================

fn text_content(role: Option<&str>, text: String) -> GeminiContent {
    GeminiContent {
        role: role.map(str::to_string),
        parts: vec![GeminiPart { text: Some(text) }],
    }
}

/// Split out the system instruction and map roles to `user`/`model`.
fn convert_messages(messages: Vec<Message>) -> (Option<GeminiContent>, Vec<GeminiContent>) {
    let mut system = None;
    let mut contents = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::System => {
                system = Some(text_content(None, msg.content));
                continue;
            }
            Role::User => "user",
            Role::Assistant => "model",
        };
        contents.push(text_content(Some(role), msg.content));
    }

    (system, contents)
}

fn convert_response(response: GeminiResponse) -> LLMResponse {
    let content = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    let mut llm_response = LLMResponse::text(&content);
    if let Some(usage) = response.usage_metadata {
        llm_response = llm_response.with_usage(Usage::new(
            usage.prompt_token_count,
            usage.candidates_token_count,
        ));
    }
    llm_response
}

// ============================================================================
// LLMProvider Implementation
// ============================================================================

#[async_trait]
impl LLMProvider for GeminiProvider {
    async fn chat(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        options: ChatOptions,
    ) -> Result<LLMResponse> {
        let model = model.unwrap_or(DEFAULT_MODEL);
        let (system_instruction, contents) = convert_messages(messages);

        let generation_config = if options.max_tokens.is_some() || options.temperature.is_some() {
            Some(GenerationConfig {
                max_output_tokens: options.max_tokens,
                temperature: options.temperature,
            })
        } else {
            None
        };

        let request = GeminiRequest {
            contents,
            system_instruction,
            generation_config,
        };

        debug!("Gemini request to model {}", model);

        let response = self
            .client
            .post(self.endpoint(model))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(classify_transport_error)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let error_text = response.text().await.unwrap_or_default();

            let body = match serde_json::from_str::<GeminiErrorResponse>(&error_text) {
                Ok(err) => format!(
                    "Gemini API error: {} - {}",
                    err.error.status.unwrap_or_else(|| "ERROR".to_string()),
                    err.error.message
                ),
                Err(_) => format!("Gemini API error: {}", error_text),
            };
            return Err(RoundtableError::from(parse_provider_error(status, &body)));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            RoundtableError::Provider(format!("Failed to parse Gemini response: {}", e))
        })?;

        Ok(convert_response(gemini_response))
    }

    fn default_model(&self) -> &str {
        DEFAULT_MODEL
    }

    fn name(&self) -> &str {
        "gemini"
    }
}
