//! Error taxonomy for the consensus engine and its collaborators

use thiserror::Error;

/// Errors surfaced by a consensus round or by node construction.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// Phase 1 collected fewer promises than the majority threshold.
    #[error("prepare phase got {acks} of {needed} required promises")]
    PrepareQuorumFailed { acks: usize, needed: usize },

    /// Phase 2 collected fewer accepts than the majority threshold.
    #[error("accept phase got {acks} of {needed} required accepts")]
    AcceptQuorumFailed { acks: usize, needed: usize },

    /// A round was requested before the neighbor set was installed.
    #[error("peer set is empty; set_neighbors must complete before propose")]
    PeersNotConfigured,

    /// The retrying entry point ran out of attempts.
    #[error("consensus not reached after {attempts} attempts: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<ConsensusError>,
    },

    #[error("invalid node configuration: {0}")]
    Config(String),
}

/// A peer call that produced no structured reply. Tolerated by the
/// proposer: the peer simply does not count toward the quorum.
#[derive(Debug, Error)]
#[error("transport error talking to {peer}: {reason}")]
pub struct TransportError {
    pub peer: String,
    pub reason: String,
}

/// Durable store failures.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("no value persisted yet")]
    Empty,

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
