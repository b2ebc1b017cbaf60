//! Single-decree Paxos over a fixed set of HTTP peer nodes.
//!
//! A fixed cluster of nodes agrees on one replicated string value
//! despite node and network failures. Each node runs an acceptor and a
//! proposer; an external write enters at any node's `/propose` (or
//! retrying `/force-write`) endpoint and runs the two-phase protocol
//! against every peer.
//!
//! ## Structure
//! - `consensus/` - Paxos roles, quorum arithmetic, transport seam
//! - `network/` - actix-web remote surface + reqwest peer transport
//! - `storage/` - durable accepted-value store (SQLite)
//! - `node.rs` - per-node wiring and fault-injection controls
//! - `logger.rs` - tracing setup
//! - `error.rs` - error taxonomy

pub mod consensus;
pub mod error;
pub mod logger;
pub mod network;
pub mod node;
pub mod storage;

pub use consensus::{Acceptor, PeerTransport, Proposer};
pub use error::ConsensusError;
pub use node::ConsensusNode;
