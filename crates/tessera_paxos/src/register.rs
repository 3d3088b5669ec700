//! In-memory single-round proposal register.
//!
//! One slot per row identity; a proposal commits iff its ballot is at least
//! the highest ballot the slot has promised. This is the single-round
//! "propose and commit" abstraction the write engine targets; a multi-phase
//! ballot-promise protocol can replace it behind the same outcome type.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::ballot::Ballot;

/// Outcome of a single-round proposal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProposalOutcome {
    Accepted,
    Superseded { promised: Ballot },
}

#[derive(Debug)]
struct Slot<V> {
    promised: Ballot,
    committed: Option<V>,
}

/// Ballot-ordered register keyed by an opaque row identity.
#[derive(Debug, Default)]
pub struct PaxosRegister<V> {
    slots: Mutex<HashMap<Vec<u8>, Slot<V>>>,
}

impl<V: Clone> PaxosRegister<V> {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Latest committed value for `key`, if any proposal has been accepted.
    pub fn committed(&self, key: &[u8]) -> Option<V> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).and_then(|slot| slot.committed.clone())
    }

    /// Highest ballot promised for `key`.
    pub fn promised(&self, key: &[u8]) -> Ballot {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).map(|slot| slot.promised).unwrap_or(Ballot::zero())
    }

    pub fn propose(&self, key: &[u8], ballot: Ballot, value: V) -> ProposalOutcome {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = slots.entry(key.to_vec()).or_insert(Slot {
            promised: Ballot::zero(),
            committed: None,
        });

        if ballot < slot.promised {
            debug!(
                proposed = ballot.counter,
                promised = slot.promised.counter,
                "proposal superseded"
            );
            return ProposalOutcome::Superseded {
                promised: slot.promised,
            };
        }

        slot.promised = ballot;
        slot.committed = Some(value);
        ProposalOutcome::Accepted
    }
}
