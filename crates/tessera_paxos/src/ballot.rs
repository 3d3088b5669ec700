//! Ballot identifiers for ordering competing proposals.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Logical node identifier of a coordinator.
pub type NodeId = u64;

/// Ballot used to resolve conflicts between competing proposals for the
/// same partition and row.
///
/// Ordering is `(counter, node_id)`, so two coordinators issuing ballots
/// in the same clock tick are still totally ordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Ballot {
    pub counter: u64,
    pub node_id: NodeId,
}

impl Ballot {
    pub const fn zero() -> Self {
        Self {
            counter: 0,
            node_id: 0,
        }
    }
}

impl Ord for Ballot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.counter, self.node_id).cmp(&(other.counter, other.node_id))
    }
}

impl PartialOrd for Ballot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros()
        .min(u128::from(u64::MAX)) as u64
}

/// Strictly monotonic ballot source for one coordinator process.
///
/// Counters are derived from the wall clock in microseconds; if the clock
/// stalls or steps backwards, the counter still advances by one per call,
/// so a ballot is never reused within the process.
#[derive(Debug)]
pub struct BallotGenerator {
    node_id: NodeId,
    last_counter: AtomicU64,
}

impl BallotGenerator {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            last_counter: AtomicU64::new(now_micros()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn next(&self) -> Ballot {
        let now = now_micros();
        let mut last = self.last_counter.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(last.saturating_add(1));
            match self.last_counter.compare_exchange_weak(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    return Ballot {
                        counter: candidate,
                        node_id: self.node_id,
                    }
                }
                Err(observed) => last = observed,
            }
        }
    }
}
