//! Next-speaker selection.
//!
//! The next speaker is drawn uniformly at random from the roster, excluding
//! whoever spoke last.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::agent::AgentId;
use crate::error::{Result, RoundtableError};

/// Pick the next speaker.
///
/// Duplicate ids in `roster` count once. A `previous` speaker that is not in
/// the roster excludes nobody.
///
/// # Errors
/// `InsufficientAgents` when the roster has fewer than two distinct agents.
///
/// # Example
/// ```
/// use rand::SeedableRng;
/// use rand::rngs::StdRng;
/// use roundtable::agent::AgentId;
/// use roundtable::conversation::select_next;
///
/// let roster = vec![AgentId::new("A"), AgentId::new("B")];
/// let mut rng = StdRng::seed_from_u64(7);
/// let next = select_next(&roster, Some(&roster[0]), &mut rng).unwrap();
/// assert_eq!(next, roster[1]);
/// ```
pub fn select_next<R: Rng + ?Sized>(
    roster: &[AgentId],
    previous: Option<&AgentId>,
    rng: &mut R,
) -> Result<AgentId> {
    let mut distinct: Vec<&AgentId> = Vec::with_capacity(roster.len());
    for id in roster {
        if !distinct.contains(&id) {
            distinct.push(id);
        }
    }
    if distinct.len() < 2 {
        return Err(RoundtableError::InsufficientAgents {
            available: distinct.len(),
        });
    }

    let eligible: Vec<&AgentId> = distinct
        .iter()
        .copied()
        .filter(|id| Some(*id) != previous)
        .collect();

    eligible
        .choose(rng)
        .map(|id| (*id).clone())
        .ok_or(RoundtableError::InsufficientAgents { available: 0 })
}

/// [`select_next`] plus the bookkeeping of who spoke last.
#[derive(Debug, Clone)]
pub struct TurnSelector<R = StdRng> {
    roster: Vec<AgentId>,
    previous: Option<AgentId>,
    rng: R,
}

impl TurnSelector<StdRng> {
    /// Selector seeded from OS entropy.
    pub fn from_entropy(roster: Vec<AgentId>) -> Result<Self> {
        Self::new(roster, StdRng::from_entropy())
    }

    /// Reproducible selector.
    pub fn seeded(roster: Vec<AgentId>, seed: u64) -> Result<Self> {
        Self::new(roster, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> TurnSelector<R> {
    pub fn new(roster: Vec<AgentId>, rng: R) -> Result<Self> {
        let mut distinct: Vec<AgentId> = Vec::with_capacity(roster.len());
        for id in roster {
            if !distinct.contains(&id) {
                distinct.push(id);
            }
        }
        if distinct.len() < 2 {
            return Err(RoundtableError::InsufficientAgents {
                available: distinct.len(),
            });
        }
        Ok(Self {
            roster: distinct,
            previous: None,
            rng,
        })
    }

    /// Choose the next speaker and remember it.
    pub fn next_speaker(&mut self) -> Result<AgentId> {
        let next = select_next(&self.roster, self.previous.as_ref(), &mut self.rng)?;
        self.previous = Some(next.clone());
        Ok(next)
    }

    pub fn previous(&self) -> Option<&AgentId> {
        self.previous.as_ref()
    }

    pub fn roster(&self) -> &[AgentId] {
        &self.roster
    }
}
