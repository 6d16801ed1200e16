//! Provider registry and roster assembly.
//!
//! This module centralizes provider metadata and the mapping from
//! configuration to the agents that take part in a conversation.

use std::sync::Arc;

use tracing::{info, warn};

use super::{ClaudeProvider, GeminiProvider, LLMProvider, OpenAIProvider};
use crate::agent::Agent;
use crate::config::{AgentEntry, Config, ProviderConfig};
use crate::pricing::PricingTable;
use crate::providers::ChatOptions;

/// Metadata describing an LLM provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderSpec {
    /// Config key / provider id (e.g. "openai").
    pub name: &'static str,
    /// Name the agent speaks under unless overridden.
    pub display_name: &'static str,
    /// Environment variable conventionally holding the API key.
    pub env_key: &'static str,
    /// Model used unless overridden.
    pub default_model: &'static str,
}

/// Provider registry in roster order.
pub const PROVIDER_REGISTRY: &[ProviderSpec] = &[
    ProviderSpec {
        name: "openai",
        display_name: "ChatGPT",
        env_key: "OPENAI_API_KEY",
        default_model: super::openai::DEFAULT_MODEL,
    },
    ProviderSpec {
        name: "anthropic",
        display_name: "Claude",
        env_key: "ANTHROPIC_API_KEY",
        default_model: super::claude::DEFAULT_MODEL,
    },
    ProviderSpec {
        name: "gemini",
        display_name: "Gemini",
        env_key: "GOOGLE_API_KEY",
        default_model: super::gemini::DEFAULT_MODEL,
    },
];

/// Look up a provider by id.
pub fn find_spec(name: &str) -> Option<&'static ProviderSpec> {
    PROVIDER_REGISTRY.iter().find(|spec| spec.name == name)
}

/// Agents ready to talk, plus the providers that were left out and why.
#[derive(Debug, Default)]
pub struct Roster {
    pub agents: Vec<Agent>,
    /// (provider id, reason)
    pub missing: Vec<(&'static str, String)>,
}

fn provider_config_by_name<'a>(config: &'a Config, name: &str) -> Option<&'a ProviderConfig> {
    match name {
        "openai" => config.providers.openai.as_ref(),
        "anthropic" => config.providers.anthropic.as_ref(),
        "gemini" => config.providers.gemini.as_ref(),
        _ => None,
    }
}

fn agent_entry_by_name<'a>(config: &'a Config, name: &str) -> Option<&'a AgentEntry> {
    match name {
        "openai" => Some(&config.agents.openai),
        "anthropic" => Some(&config.agents.anthropic),
        "gemini" => Some(&config.agents.gemini),
        _ => None,
    }
}

fn configured_api_key(provider: Option<&ProviderConfig>) -> Option<&str> {
    provider
        .and_then(|p| p.api_key.as_deref())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

fn configured_api_base(provider: Option<&ProviderConfig>) -> Option<&str> {
    provider
        .and_then(|p| p.api_base.as_deref())
        .map(str::trim)
        .filter(|b| !b.is_empty())
}

fn make_provider(spec: &ProviderSpec, api_key: &str, api_base: Option<&str>) -> Arc<dyn LLMProvider> {
    match (spec.name, api_base) {
        ("anthropic", Some(base)) => Arc::new(ClaudeProvider::with_api_url(
            api_key,
            &format!("{}/v1/messages", base.trim_end_matches('/')),
        )),
        ("anthropic", None) => Arc::new(ClaudeProvider::new(api_key)),
        ("gemini", Some(base)) => Arc::new(GeminiProvider::with_base_url(api_key, base)),
        ("gemini", None) => Arc::new(GeminiProvider::new(api_key)),
        (_, Some(base)) => Arc::new(OpenAIProvider::with_base_url(api_key, base)),
        (_, None) => Arc::new(OpenAIProvider::new(api_key)),
    }
}

/// Build one agent per configured provider, in registry order.
///
/// Providers without an API key, or disabled in `agents.<id>.enabled`, end
/// up in [`Roster::missing`]. Whether the roster is large enough is the
/// caller's concern.
pub fn build_roster(config: &Config, pricing: &PricingTable) -> Roster {
    let defaults = &config.agents.defaults;
    let options = ChatOptions::new()
        .with_max_tokens(defaults.max_tokens)
        .with_temperature(defaults.temperature);

    let mut roster = Roster::default();
    for spec in PROVIDER_REGISTRY {
        let entry = agent_entry_by_name(config, spec.name).cloned().unwrap_or_default();
        if !entry.enabled {
            roster.missing.push((spec.name, "disabled in config".to_string()));
            continue;
        }

        let provider_config = provider_config_by_name(config, spec.name);
        let Some(api_key) = configured_api_key(provider_config) else {
            warn!(provider = spec.name, env = spec.env_key, "API key not set");
            roster
                .missing
                .push((spec.name, format!("{} not set", spec.env_key)));
            continue;
        };

        let provider = make_provider(spec, api_key, configured_api_base(provider_config));
        let model = entry
            .model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(spec.default_model);
        let name = entry
            .name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(spec.display_name);

        let agent = Agent::new(name, provider, pricing.lookup(model))
            .with_model(model)
            .with_options(options.clone())
            .with_max_response_chars(defaults.max_response_chars);
        info!(agent = name, provider = spec.name, model, "Agent ready");
        roster.agents.push(agent);
    }
    roster
}
