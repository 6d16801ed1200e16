//! Usage accumulator: per-agent and aggregate token and cost totals.
//!
//! The accumulator is owned by a single conversation loop and is the only
//! thing that mutates usage. Every call to [`UsageAccumulator::record`] hands
//! back an owned [`UsageState`] snapshot for the budget governor and sinks.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::agent::AgentId;
use crate::error::{Result, RoundtableError};
use crate::pricing::{Cost, Pricing};
use crate::transcript::Turn;

/// Token and cost totals for one agent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: Cost,
    /// Number of completed turns.
    pub turns: u64,
}

impl AgentUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }

    fn add(&mut self, input_tokens: u64, output_tokens: u64, cost: Cost) {
        self.input_tokens = self.input_tokens.saturating_add(input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(output_tokens);
        self.cost += cost;
        self.turns = self.turns.saturating_add(1);
    }
}

/// Snapshot of the running usage totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageState {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    pub total_cost: Cost,
    pub per_agent: BTreeMap<AgentId, AgentUsage>,
}

impl UsageState {
    /// Input plus output tokens, the figure the budget is enforced against.
    pub fn total_tokens(&self) -> u64 {
        self.total_input_tokens
            .saturating_add(self.total_output_tokens)
    }

    pub fn agent(&self, agent: &AgentId) -> Option<&AgentUsage> {
        self.per_agent.get(agent)
    }

    /// Recompute usage from a transcript using the cost stored on each turn.
    ///
    /// For any session this equals the accumulator's final snapshot, apart
    /// from roster agents that never spoke (present in the live snapshot with
    /// zero usage, absent here).
    pub fn replay(turns: &[Turn]) -> UsageState {
        let mut state = UsageState::default();
        for turn in turns {
            state.apply(&turn.speaker, turn.input_tokens, turn.output_tokens, turn.cost);
        }
        state
    }

    /// Same totals, ignoring agents that never spoke.
    pub fn same_totals(&self, other: &UsageState) -> bool {
        let active = |s: &UsageState| -> BTreeMap<AgentId, AgentUsage> {
            s.per_agent
                .iter()
                .filter(|(_, u)| u.turns > 0)
                .map(|(k, v)| (k.clone(), *v))
                .collect()
        };
        self.total_input_tokens == other.total_input_tokens
            && self.total_output_tokens == other.total_output_tokens
            && self.total_cost == other.total_cost
            && active(self) == active(other)
    }

    fn apply(&mut self, agent: &AgentId, input_tokens: u64, output_tokens: u64, cost: Cost) {
        self.total_input_tokens = self.total_input_tokens.saturating_add(input_tokens);
        self.total_output_tokens = self.total_output_tokens.saturating_add(output_tokens);
        self.total_cost += cost;
        self.per_agent
            .entry(agent.clone())
            .or_default()
            .add(input_tokens, output_tokens, cost);
    }
}

/// Result of recording one completed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedUsage {
    /// Incremental cost of this call.
    pub cost: Cost,
    /// Totals after this call.
    pub snapshot: UsageState,
}

/// Accumulates usage for a fixed roster of agents.
#[derive(Debug, Clone)]
pub struct UsageAccumulator {
    pricing: HashMap<AgentId, Pricing>,
    state: UsageState,
}

impl UsageAccumulator {
    /// Create an accumulator for the given agents and their pricing.
    ///
    /// Every agent starts with a zero entry so summaries list silent agents too.
    pub fn new<I>(agents: I) -> Self
    where
        I: IntoIterator<Item = (AgentId, Pricing)>,
    {
        let pricing: HashMap<AgentId, Pricing> = agents.into_iter().collect();
        let mut state = UsageState::default();
        for agent in pricing.keys() {
            state.per_agent.insert(agent.clone(), AgentUsage::default());
        }
        Self { pricing, state }
    }

    /// Record one completed call by `agent`.
    ///
    /// # Errors
    /// `NotFound` if `agent` was not registered; totals are left untouched.
    pub fn record(
        &mut self,
        agent: &AgentId,
        input_tokens: u64,
        output_tokens: u64,
    ) -> Result<RecordedUsage> {
        let pricing = self
            .pricing
            .get(agent)
            .ok_or_else(|| RoundtableError::NotFound(format!("no pricing for agent {}", agent)))?;
        let cost = pricing.cost(input_tokens, output_tokens);
        self.state.apply(agent, input_tokens, output_tokens, cost);
        Ok(RecordedUsage {
            cost,
            snapshot: self.state.clone(),
        })
    }

    pub fn snapshot(&self) -> UsageState {
        self.state.clone()
    }

    pub fn state(&self) -> &UsageState {
        &self.state
    }

    pub fn pricing(&self, agent: &AgentId) -> Option<Pricing> {
        self.pricing.get(agent).copied()
    }

    /// Tokens left before `ceiling`, never negative.
    pub fn remaining_tokens(&self, ceiling: u64) -> u64 {
        ceiling.saturating_sub(self.state.total_tokens())
    }

    /// Share of `ceiling` used, in percent. Zero when the ceiling is zero.
    pub fn usage_percentage(&self, ceiling: u64) -> f64 {
        usage_percentage(&self.state, ceiling)
    }
}

/// Share of `ceiling` used by `usage`, in percent.
pub fn usage_percentage(usage: &UsageState, ceiling: u64) -> f64 {
    if ceiling == 0 {
        return 0.0;
    }
    usage.total_tokens() as f64 / ceiling as f64 * 100.0
}
