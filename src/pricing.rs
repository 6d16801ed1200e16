//! Pricing table and fixed-point cost arithmetic.
//!
//! Every provider bills per token, but at very different rates, and some
//! models are used inside a free tier. Costs are kept as integer nano-dollars
//! ([`Cost`]) so that summing thousands of turns never drifts.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// Nano-dollars per dollar.
const NANOS_PER_USD: u64 = 1_000_000_000;

/// Tokens per "million tokens", the unit providers publish prices in.
const TOKENS_PER_MILLION: u64 = 1_000_000;

/// A non-negative USD amount in fixed-point nano-dollars (1e-9 USD).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Cost(u64);

impl Cost {
    /// Zero dollars.
    pub const ZERO: Cost = Cost(0);

    /// Build a cost from raw nano-dollars.
    pub const fn from_nanos(nanos: u64) -> Self {
        Cost(nanos)
    }

    /// Raw nano-dollars.
    pub const fn nanos(self) -> u64 {
        self.0
    }

    /// Approximate dollars, for display and for JSON summaries only.
    pub fn as_usd(self) -> f64 {
        self.0 as f64 / NANOS_PER_USD as f64
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_add(self, other: Cost) -> Cost {
        Cost(self.0.saturating_add(other.0))
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        self.saturating_add(rhs)
    }
}

impl AddAssign for Cost {
    fn add_assign(&mut self, rhs: Cost) {
        *self = self.saturating_add(rhs);
    }
}

impl std::iter::Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, |acc, c| acc + c)
    }
}

/// Formats as dollars with four decimals, e.g. `$0.0125`.
impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Round half up to 1e-4 USD using integer math.
        let tenth_millis = (self.0 + 50_000) / 100_000;
        write!(f, "${}.{:04}", tenth_millis / 10_000, tenth_millis % 10_000)
    }
}

/// Per-token rates for one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tier", rename_all = "snake_case")]
pub enum Pricing {
    /// Usage inside a free tier. Always reports zero cost.
    Free,
    /// Billed usage, rates in nano-dollars per token.
    Metered {
        input_nanos_per_token: u64,
        output_nanos_per_token: u64,
    },
}

impl Pricing {
    /// Build a metered price from the usual "USD per 1M tokens" figures.
    ///
    /// Rates are rounded to the nearest nano-dollar per token, which is exact
    /// for every published price with at most three decimals.
    ///
    /// # Example
    /// ```
    /// use roundtable::pricing::Pricing;
    ///
    /// let gpt4o = Pricing::per_million(2.50, 10.00);
    /// assert_eq!(gpt4o.cost(1_000_000, 0).nanos(), 2_500_000_000);
    /// ```
    pub fn per_million(input_usd: f64, output_usd: f64) -> Self {
        Pricing::Metered {
            input_nanos_per_token: usd_per_million_to_nanos(input_usd),
            output_nanos_per_token: usd_per_million_to_nanos(output_usd),
        }
    }

    /// Cost of a single call.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> Cost {
        match self {
            Pricing::Free => Cost::ZERO,
            Pricing::Metered {
                input_nanos_per_token,
                output_nanos_per_token,
            } => {
                let input = input_tokens.saturating_mul(*input_nanos_per_token);
                let output = output_tokens.saturating_mul(*output_nanos_per_token);
                Cost(input.saturating_add(output))
            }
        }
    }

    pub fn is_free(&self) -> bool {
        match self {
            Pricing::Free => true,
            Pricing::Metered {
                input_nanos_per_token,
                output_nanos_per_token,
            } => *input_nanos_per_token == 0 && *output_nanos_per_token == 0,
        }
    }

    /// Human-readable rates, e.g. `$2.50 / $10.00 per 1M tokens`.
    pub fn describe(&self) -> String {
        match self {
            Pricing::Free => "free tier".to_string(),
            Pricing::Metered {
                input_nanos_per_token,
                output_nanos_per_token,
            } => format!(
                "${:.2} / ${:.2} per 1M tokens",
                nanos_to_usd_per_million(*input_nanos_per_token),
                nanos_to_usd_per_million(*output_nanos_per_token)
            ),
        }
    }
}

fn usd_per_million_to_nanos(usd: f64) -> u64 {
    if !usd.is_finite() || usd <= 0.0 {
        return 0;
    }
    // usd / 1M tokens * 1e9 nanos = usd * 1000 nanos per token
    (usd * (NANOS_PER_USD / TOKENS_PER_MILLION) as f64).round() as u64
}

fn nanos_to_usd_per_million(nanos: u64) -> f64 {
    nanos as f64 / (NANOS_PER_USD / TOKENS_PER_MILLION) as f64
}

/// Price entry as it appears in the config file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceOverride {
    /// USD per 1M input tokens
    pub input_per_million: f64,
    /// USD per 1M output tokens
    pub output_per_million: f64,
}

impl From<PriceOverride> for Pricing {
    fn from(p: PriceOverride) -> Self {
        if p.input_per_million <= 0.0 && p.output_per_million <= 0.0 {
            Pricing::Free
        } else {
            Pricing::per_million(p.input_per_million, p.output_per_million)
        }
    }
}

/// Mapping from model identifier to [`Pricing`].
///
/// Lookups match the exact model id first, then the longest registered
/// prefix, so `gpt-4o-2024-08-06` resolves to the `gpt-4o` entry. Unknown
/// models are priced as [`Pricing::Free`] and logged.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingTable {
    entries: HashMap<String, Pricing>,
}

impl PricingTable {
    /// An empty table; every lookup falls through to free.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Built-in prices for the three default agents.
    pub fn builtin() -> Self {
        let mut table = Self::empty();
        table.insert("gpt-4o", Pricing::per_million(2.50, 10.00));
        table.insert("claude-3-5-sonnet", Pricing::per_million(3.00, 15.00));
        table.insert("claude-sonnet-4", Pricing::per_million(3.00, 15.00));
        // Gemini 2.0 Flash runs inside the free tier.
        table.insert("gemini-2.0-flash", Pricing::Free);
        table
    }

    /// Built-in prices with config overrides applied on top.
    pub fn with_overrides(overrides: &HashMap<String, PriceOverride>) -> Self {
        let mut table = Self::builtin();
        for (model, price) in overrides {
            table.insert(model, (*price).into());
        }
        table
    }

    pub fn insert(&mut self, model: &str, pricing: Pricing) {
        self.entries.insert(model.to_string(), pricing);
    }

    /// Exact or longest-prefix match, if any.
    pub fn get(&self, model: &str) -> Option<Pricing> {
        if let Some(p) = self.entries.get(model) {
            return Some(*p);
        }
        self.entries
            .iter()
            .filter(|(key, _)| model.starts_with(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, p)| *p)
    }

    /// Pricing for `model`, defaulting to free for unknown models.
    pub fn lookup(&self, model: &str) -> Pricing {
        match self.get(model) {
            Some(p) => p,
            None => {
                tracing::warn!(model = %model, "No price registered for model, treating as free");
                Pricing::Free
            }
        }
    }

    /// Entries sorted by model id.
    pub fn entries(&self) -> Vec<(&str, Pricing)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PricingTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_million_rates() {
        let p = Pricing::per_million(2.50, 10.00);
        assert_eq!(
            p,
            Pricing::Metered {
                input_nanos_per_token: 2_500,
                output_nanos_per_token: 10_000,
            }
        );
    }

    #[test]
    fn test_cost_gpt4o() {
        let p = Pricing::per_million(2.50, 10.00);
        // 1000 * 2.5e-6 + 500 * 1e-5 = 0.0025 + 0.005
        assert_eq!(p.cost(1_000, 500), Cost::from_nanos(7_500_000));
        assert_eq!(p.cost(1_000, 500).to_string(), "$0.0075");
    }

    #[test]
    fn test_free_tier_is_zero() {
        assert_eq!(Pricing::Free.cost(1_000_000, 1_000_000), Cost::ZERO);
        assert!(Pricing::Free.is_free());
        assert!(Pricing::per_million(0.0, 0.0).is_free());
    }

    #[test]
    fn test_cost_display_rounding() {
        assert_eq!(Cost::ZERO.to_string(), "$0.0000");
        assert_eq!(Cost::from_nanos(49_999).to_string(), "$0.0000");
        assert_eq!(Cost::from_nanos(50_000).to_string(), "$0.0001");
        assert_eq!(Cost::from_nanos(12_345_678_900).to_string(), "$12.3457");
    }

    #[test]
    fn test_cost_sum_has_no_drift() {
        let p = Pricing::per_million(3.00, 15.00);
        let one = p.cost(7, 3);
        let total: Cost = std::iter::repeat(one).take(100_000).sum();
        assert_eq!(total.nanos(), one.nanos() * 100_000);
    }

    #[test]
    fn test_builtin_lookup_prefix() {
        let table = PricingTable::builtin();
        assert_eq!(
            table.lookup("gpt-4o-2024-08-06"),
            Pricing::per_million(2.50, 10.00)
        );
        assert_eq!(
            table.lookup("claude-3-5-sonnet-20241022"),
            Pricing::per_million(3.00, 15.00)
        );
        assert_eq!(table.lookup("gemini-2.0-flash-exp"), Pricing::Free);
    }

    #[test]
    fn test_longest_prefix_wins() {
        let mut table = PricingTable::empty();
        table.insert("gpt-4o", Pricing::per_million(2.50, 10.00));
        table.insert("gpt-4o-mini", Pricing::per_million(0.15, 0.60));
        assert_eq!(
            table.lookup("gpt-4o-mini-2024-07-18"),
            Pricing::per_million(0.15, 0.60)
        );
    }

    #[test]
    fn test_unknown_model_is_free() {
        let table = PricingTable::builtin();
        assert!(table.get("llama-3").is_none());
        assert_eq!(table.lookup("llama-3"), Pricing::Free);
    }

    #[test]
    fn test_overrides_replace_builtin() {
        let mut overrides = HashMap::new();
        overrides.insert(
            "gpt-4o".to_string(),
            PriceOverride {
                input_per_million: 5.0,
                output_per_million: 15.0,
            },
        );
        overrides.insert(
            "gemini-2.0-flash".to_string(),
            PriceOverride {
                input_per_million: 0.10,
                output_per_million: 0.40,
            },
        );
        let table = PricingTable::with_overrides(&overrides);
        assert_eq!(table.lookup("gpt-4o"), Pricing::per_million(5.0, 15.0));
        assert!(!table.lookup("gemini-2.0-flash-exp").is_free());
    }

    #[test]
    fn test_describe() {
        assert_eq!(Pricing::Free.describe(), "free tier");
        assert_eq!(
            Pricing::per_million(3.0, 15.0).describe(),
            "$3.00 / $15.00 per 1M tokens"
        );
    }

    #[test]
    fn test_pricing_serde() {
        let json = serde_json::to_string(&Pricing::Free).unwrap();
        assert_eq!(json, r#"{"tier":"free"}"#);
        let metered: Pricing = serde_json::from_str(
            r#"{"tier":"metered","input_nanos_per_token":3000,"output_nanos_per_token":15000}"#,
        )
        .unwrap();
        assert_eq!(metered, Pricing::per_million(3.0, 15.0));
    }
}
