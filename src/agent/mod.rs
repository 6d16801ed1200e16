//! Agent module - one conversation participant bound to an LLM provider
//!
//! An [`Agent`] pairs a display identity ("ChatGPT", "Claude", ...) with the
//! provider that answers for it, the model it uses and the price of that
//! model. Agents are assembled once at session setup and never change while
//! the session runs.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::conversation::PromptContext;
use crate::error::{Result, RoundtableError};
use crate::pricing::Pricing;
use crate::providers::{ChatOptions, LLMProvider, Message};

/// Default cap on reply length, in characters.
pub const DEFAULT_MAX_RESPONSE_CHARS: usize = 1000;

/// Stable identity of an agent within a session, also its display name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    /// # Example
    /// ```
    /// use roundtable::agent::AgentId;
    ///
    /// let id = AgentId::new("Claude");
    /// assert_eq!(id.as_str(), "Claude");
    /// assert_eq!(id.to_string(), "Claude");
    /// ```
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// What one successful invocation produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub text: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A conversation participant.
#[derive(Clone)]
pub struct Agent {
    id: AgentId,
    provider: Arc<dyn LLMProvider>,
    model: String,
    pricing: Pricing,
    options: ChatOptions,
    max_response_chars: usize,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("pricing", &self.pricing)
            .finish()
    }
}

impl Agent {
    /// Create an agent that answers through `provider` using its default model.
    pub fn new(id: impl Into<String>, provider: Arc<dyn LLMProvider>, pricing: Pricing) -> Self {
        let model = provider.default_model().to_string();
        Self {
            id: AgentId::new(id),
            provider,
            model,
            pricing,
            options: ChatOptions::default(),
            max_response_chars: DEFAULT_MAX_RESPONSE_CHARS,
        }
    }

    /// Use a specific model instead of the provider default.
    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
        self
    }

    /// Cap reply length. Zero disables the cap.
    pub fn with_max_response_chars(mut self, max: usize) -> Self {
        self.max_response_chars = max;
        self
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pricing(&self) -> Pricing {
        self.pricing
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Ask this agent for its next contribution.
    ///
    /// The context is only read. Token counts default to zero when the
    /// provider does not report usage. Any provider failure comes back as
    /// [`RoundtableError::Invocation`] naming this agent.
    pub async fn invoke(&self, context: &PromptContext<'_>) -> Result<AgentReply> {
        let messages = context.messages_for(&self.id);
        debug!(
            agent = %self.id,
            model = %self.model,
            messages = messages.len(),
            "Invoking agent"
        );

        let response = self
            .provider
            .chat(messages, Some(&self.model), self.options.clone())
            .await
            .map_err(|e| RoundtableError::invocation(self.id.as_str(), e))?;

        let (input_tokens, output_tokens) = response
            .usage
            .map(|u| (u64::from(u.prompt_tokens), u64::from(u.completion_tokens)))
            .unwrap_or((0, 0));

        Ok(AgentReply {
            text: truncate_chars(response.content.trim(), self.max_response_chars),
            input_tokens,
            output_tokens,
        })
    }

    /// Send a tiny "Hello" request to check credentials and connectivity.
    pub async fn probe(&self) -> Result<()> {
        let options = ChatOptions::new().with_max_tokens(10);
        self.provider
            .chat(vec![Message::user("Hello")], Some(&self.model), options)
            .await
            .map(|_| ())
            .map_err(|e| RoundtableError::invocation(self.id.as_str(), e))
    }
}

/// Keep at most `max` characters, trimming trailing whitespace left by the cut.
fn truncate_chars(text: &str, max: usize) -> String {
    if max == 0 {
        return text.to_string();
    }
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].trim_end().to_string(),
        None => text.to_string(),
    }
}
