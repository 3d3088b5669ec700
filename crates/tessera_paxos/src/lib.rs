//! Single-round proposal primitives for the Tessera write engine.
//!
//! These types are kept in a small, dependency-light crate because they are
//! shared by the write engine and by consensus-boundary implementations
//! (including the in-memory register used in tests and embedded setups).

pub mod ballot;
pub mod register;

pub use ballot::{Ballot, BallotGenerator, NodeId};
pub use register::{PaxosRegister, ProposalOutcome};
