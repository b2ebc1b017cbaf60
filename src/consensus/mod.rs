//! Single-decree Paxos engine
//!
//! ## Structure
//! - `acceptor.rs` - promise/accept state and decision rules
//! - `proposer.rs` - two-phase rounds and the retrying entry point
//! - `quorum.rs` - majority threshold arithmetic
//! - `traits.rs` - peer transport seam
//! - `types.rs` - wire messages and vote tallies
//! - `tests.rs` - engine tests over an in-memory cluster

// Re-export public API
pub use acceptor::{Acceptor, AcceptorState};
pub use proposer::Proposer;
pub use quorum::majority;
pub use traits::PeerTransport;
pub use types::{
    AcceptReply, AcceptRequest, PeerVote, PrepareReply, PrepareRequest, ProposalNumber, Tally,
};

pub mod acceptor;
pub mod proposer;
pub mod quorum;
pub mod traits;
pub mod types;

// Tests
#[cfg(test)]
#[path = "tests.rs"]
mod tests;
