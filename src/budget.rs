//! Budget governor: classifies usage against a hard token ceiling.
//!
//! [`classify`] is a pure function. Acting on the result (warn once, stop at
//! the ceiling) is the conversation loop's job.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RoundtableError};
use crate::usage::UsageState;

/// Default token ceiling for a session.
pub const DEFAULT_TOKEN_CEILING: u64 = 50_000;

/// Default warning fraction (90% of the ceiling).
pub const DEFAULT_WARNING_FRACTION: f64 = 0.9;

/// Token ceiling plus warning threshold for one session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Hard ceiling on input + output tokens. Must be positive.
    pub token_ceiling: u64,
    /// Fraction of the ceiling that triggers the one-time warning, 0 < f < 1.
    pub warning_fraction: f64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            token_ceiling: DEFAULT_TOKEN_CEILING,
            warning_fraction: DEFAULT_WARNING_FRACTION,
        }
    }
}

impl BudgetConfig {
    /// Build and validate a budget.
    ///
    /// # Example
    /// ```
    /// use roundtable::budget::BudgetConfig;
    ///
    /// let budget = BudgetConfig::new(100, 0.9).unwrap();
    /// assert_eq!(budget.warning_threshold(), 90);
    /// assert!(BudgetConfig::new(0, 0.9).is_err());
    /// ```
    pub fn new(token_ceiling: u64, warning_fraction: f64) -> Result<Self> {
        let config = Self {
            token_ceiling,
            warning_fraction,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.token_ceiling == 0 {
            return Err(RoundtableError::Config(
                "token_ceiling must be a positive integer".into(),
            ));
        }
        if !(self.warning_fraction > 0.0 && self.warning_fraction < 1.0) {
            return Err(RoundtableError::Config(format!(
                "warning_fraction must be between 0 and 1 (exclusive), got {}",
                self.warning_fraction
            )));
        }
        Ok(())
    }

    /// Smallest token total that counts as a warning.
    ///
    /// Computed in integers with a small epsilon so that 100 × 0.9 is exactly
    /// 90 despite 0.9 not being representable in binary.
    pub fn warning_threshold(&self) -> u64 {
        let raw = self.token_ceiling as f64 * self.warning_fraction;
        let threshold = (raw - 1e-9).ceil().max(0.0) as u64;
        threshold.min(self.token_ceiling)
    }
}

/// Classification of the current usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetStatus {
    Ok,
    Warning,
    Exceeded,
}

/// Classify the usage against the budget.
///
/// - `Exceeded` when total tokens ≥ ceiling
/// - `Warning` when total tokens ≥ ceiling × warning_fraction
/// - `Ok` otherwise
pub fn classify(usage: &UsageState, config: &BudgetConfig) -> BudgetStatus {
    classify_total(usage.total_tokens(), config)
}

/// [`classify`] on a raw token total.
pub fn classify_total(total_tokens: u64, config: &BudgetConfig) -> BudgetStatus {
    if total_tokens >= config.token_ceiling {
        BudgetStatus::Exceeded
    } else if total_tokens >= config.warning_threshold() {
        BudgetStatus::Warning
    } else {
        BudgetStatus::Ok
    }
}
