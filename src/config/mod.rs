//! Configuration management for Roundtable
//!
//! Configuration is loaded from `~/.roundtable/config.json` with environment
//! variable overrides. A missing file means defaults.

mod types;
pub mod validate;

pub use types::*;

use crate::error::{Result, RoundtableError};
use crate::pricing::PricingTable;
use std::path::{Path, PathBuf};

impl Config {
    /// Returns the Roundtable configuration directory path (~/.roundtable)
    pub fn dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".roundtable")
    }

    /// Returns the path to the config file (~/.roundtable/config.json)
    pub fn path() -> PathBuf {
        Self::dir().join("config.json")
    }

    /// Load configuration from the default path with environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::path())
    }

    /// Load configuration from a specific path with environment overrides.
    ///
    /// If the file doesn't exist, returns the default configuration (still
    /// with overrides applied).
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Config::default()
        };

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// The conventional vendor variables (`OPENAI_API_KEY`,
    /// `ANTHROPIC_API_KEY`, `GOOGLE_API_KEY`, `DEFAULT_TOKEN_LIMIT`,
    /// `DEFAULT_THEME`) are read first; `ROUNDTABLE_SECTION_KEY` variables
    /// win over them.
    fn apply_env_overrides(&mut self) {
        // Provider API keys
        self.apply_provider_env_overrides();

        // Budget
        for var in ["DEFAULT_TOKEN_LIMIT", "ROUNDTABLE_BUDGET_TOKEN_CEILING"] {
            if let Ok(val) = std::env::var(var) {
                if let Ok(v) = val.trim().parse() {
                    self.budget.token_ceiling = v;
                }
            }
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_BUDGET_WARNING_FRACTION") {
            if let Ok(v) = val.trim().parse() {
                self.budget.warning_fraction = v;
            }
        }

        // Conversation
        for var in ["DEFAULT_THEME", "ROUNDTABLE_CONVERSATION_THEME"] {
            if let Ok(val) = std::env::var(var) {
                if !val.trim().is_empty() {
                    self.conversation.theme = val;
                }
            }
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_CONVERSATION_TURN_DELAY_SECS") {
            if let Ok(v) = val.trim().parse() {
                self.conversation.turn_delay_secs = v;
            }
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_CONVERSATION_MAX_TURNS") {
            if let Ok(v) = val.trim().parse() {
                self.conversation.max_turns = Some(v);
            }
        }

        // Agent defaults
        if let Ok(val) = std::env::var("ROUNDTABLE_AGENTS_DEFAULTS_MAX_TOKENS") {
            if let Ok(v) = val.trim().parse() {
                self.agents.defaults.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_AGENTS_DEFAULTS_TEMPERATURE") {
            if let Ok(v) = val.trim().parse() {
                self.agents.defaults.temperature = v;
            }
        }

        // Transcript / logging
        if let Ok(val) = std::env::var("ROUNDTABLE_TRANSCRIPT_DIR") {
            self.transcript.dir = val;
        }
        if let Ok(val) = std::env::var("ROUNDTABLE_LOGGING_LEVEL") {
            self.logging.level = val;
        }
    }

    /// Apply provider-specific environment variable overrides
    fn apply_provider_env_overrides(&mut self) {
        let slots = [
            (
                &mut self.providers.openai,
                ["OPENAI_API_KEY", "ROUNDTABLE_PROVIDERS_OPENAI_API_KEY"],
                "ROUNDTABLE_PROVIDERS_OPENAI_API_BASE",
            ),
            (
                &mut self.providers.anthropic,
                ["ANTHROPIC_API_KEY", "ROUNDTABLE_PROVIDERS_ANTHROPIC_API_KEY"],
                "ROUNDTABLE_PROVIDERS_ANTHROPIC_API_BASE",
            ),
            (
                &mut self.providers.gemini,
                ["GOOGLE_API_KEY", "ROUNDTABLE_PROVIDERS_GEMINI_API_KEY"],
                "ROUNDTABLE_PROVIDERS_GEMINI_API_BASE",
            ),
        ];

        for (slot, key_vars, base_var) in slots {
            for var in key_vars {
                if let Ok(val) = std::env::var(var) {
                    if !val.trim().is_empty() {
                        slot.get_or_insert_with(ProviderConfig::default).api_key =
                            Some(val.trim().to_string());
                    }
                }
            }
            if let Ok(val) = std::env::var(base_var) {
                slot.get_or_insert_with(ProviderConfig::default).api_base = Some(val);
            }
        }
    }

    /// Save configuration to the default path
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::path())
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values serde cannot: budget bounds, delays, limits.
    pub fn validate(&self) -> Result<()> {
        self.budget.validate()?;
        let delay = self.conversation.turn_delay_secs;
        if !delay.is_finite() || delay < 0.0 {
            return Err(RoundtableError::Config(format!(
                "conversation.turn_delay_secs must be a non-negative number, got {}",
                delay
            )));
        }
        if self.conversation.max_turns == Some(0) {
            return Err(RoundtableError::Config(
                "conversation.max_turns must be at least 1".to_string(),
            ));
        }
        if self.conversation.theme.trim().is_empty() {
            return Err(RoundtableError::Config(
                "conversation.theme must not be empty".to_string(),
            ));
        }
        if self.transcript.enabled && self.transcript.dir.trim().is_empty() {
            return Err(RoundtableError::Config(
                "transcript.dir must be set when transcripts are enabled".to_string(),
            ));
        }
        for (model, price) in &self.pricing {
            if price.input_per_million < 0.0 || price.output_per_million < 0.0 {
                return Err(RoundtableError::Config(format!(
                    "pricing.{}: prices must not be negative",
                    model
                )));
            }
        }
        Ok(())
    }

    /// Built-in prices with this config's overrides applied.
    pub fn pricing_table(&self) -> PricingTable {
        PricingTable::with_overrides(&self.pricing)
    }

    /// Expanded transcript directory.
    pub fn transcript_dir(&self) -> PathBuf {
        expand_home(&self.transcript.dir)
    }
}

/// Expand a leading `~/` to the user's home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::{PriceOverride, Pricing};
    use std::env;
    use std::sync::Mutex;

    // Environment variables are process-wide; serialize the tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_config_dir() {
        let dir = Config::dir();
        assert!(dir.ends_with(".roundtable"));
        assert!(Config::path().ends_with(".roundtable/config.json"));
    }

    #[test]
    fn test_env_override_vendor_keys() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("ANTHROPIC_API_KEY", " sk-ant-env ");
        env::set_var("DEFAULT_TOKEN_LIMIT", "20000");
        env::set_var("DEFAULT_THEME", "The future of cities");

        let mut config = Config::default();
        config.apply_env_overrides();

        env::remove_var("ANTHROPIC_API_KEY");
        env::remove_var("DEFAULT_TOKEN_LIMIT");
        env::remove_var("DEFAULT_THEME");

        assert_eq!(
            config.providers.anthropic.unwrap().api_key.as_deref(),
            Some("sk-ant-env")
        );
        assert_eq!(config.budget.token_ceiling, 20_000);
        assert_eq!(config.conversation.theme, "The future of cities");
    }

    #[test]
    fn test_env_override_prefixed_wins() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DEFAULT_TOKEN_LIMIT", "20000");
        env::set_var("ROUNDTABLE_BUDGET_TOKEN_CEILING", "30000");
        env::set_var("ROUNDTABLE_PROVIDERS_OPENAI_API_BASE", "http://localhost:8080/v1");

        let mut config = Config::default();
        config.apply_env_overrides();

        env::remove_var("DEFAULT_TOKEN_LIMIT");
        env::remove_var("ROUNDTABLE_BUDGET_TOKEN_CEILING");
        env::remove_var("ROUNDTABLE_PROVIDERS_OPENAI_API_BASE");

        assert_eq!(config.budget.token_ceiling, 30_000);
        let openai = config.providers.openai.unwrap();
        assert_eq!(openai.api_base.as_deref(), Some("http://localhost:8080/v1"));
    }

    #[test]
    fn test_env_override_ignores_garbage() {
        let _guard = ENV_LOCK.lock().unwrap();
        env::set_var("DEFAULT_TOKEN_LIMIT", "lots");

        let mut config = Config::default();
        config.apply_env_overrides();

        env::remove_var("DEFAULT_TOKEN_LIMIT");
        assert_eq!(config.budget.token_ceiling, 50_000);
    }

    #[test]
    fn test_save_and_load() {
        let _guard = ENV_LOCK.lock().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.conversation.theme = "Tea".to_string();
        config.budget.token_ceiling = 1234;
        config.agents.gemini.enabled = false;
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path).unwrap();
        assert_eq!(loaded.conversation.theme, "Tea");
        assert_eq!(loaded.budget.token_ceiling, 1234);
        assert!(!loaded.agents.gemini.enabled);
    }

    #[test]
    fn test_load_nonexistent() {
        let _guard = ENV_LOCK.lock().unwrap();
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.json")).unwrap();
        assert_eq!(config.budget.token_ceiling, 50_000);
    }

    #[test]
    fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Config::load_from_path(&path),
            Err(RoundtableError::Json(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(Config::default().validate().is_ok());

        let mut config = Config::default();
        config.budget.warning_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.turn_delay_secs = -1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.max_turns = Some(0);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.conversation.theme = "   ".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.pricing.insert(
            "gpt-4o".into(),
            PriceOverride {
                input_per_million: -1.0,
                output_per_million: 1.0,
            },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pricing_table_applies_overrides() {
        let mut config = Config::default();
        config.pricing.insert(
            "my-local-model".into(),
            PriceOverride {
                input_per_million: 1.0,
                output_per_million: 2.0,
            },
        );
        let table = config.pricing_table();
        assert_eq!(table.get("my-local-model"), Some(Pricing::per_million(1.0, 2.0)));
        assert!(table.get("gpt-4o").is_some());
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("logs"), PathBuf::from("logs"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/logs"), home.join("logs"));
        }
    }
}
