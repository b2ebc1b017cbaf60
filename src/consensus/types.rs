//! Wire messages and per-peer vote accounting

use serde::{Deserialize, Serialize};

/// Proposal numbers are salted with the node id at generation time so
/// that two proposers can never emit the same number.
pub type ProposalNumber = u64;

/// Phase 1 request.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct PrepareRequest {
    pub proposal: ProposalNumber,
}

/// Phase 1 reply. On a promise, `proposal`/`accepted_value` carry the
/// pair this acceptor last accepted (both `None` if it never accepted).
/// On a decline, `proposal` carries the number currently promised.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PrepareReply {
    pub ok: bool,
    pub proposal: Option<ProposalNumber>,
    pub accepted_value: Option<String>,
}

/// Phase 2 request.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AcceptRequest {
    pub proposal: ProposalNumber,
    pub value: String,
}

/// Phase 2 reply.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct AcceptReply {
    pub ok: bool,
    pub proposal: ProposalNumber,
}

/// How one peer answered one phase of a round.
///
/// `Unreachable` covers transport failures and stopped nodes alike;
/// neither counts toward the quorum and neither aborts the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerVote {
    Ack,
    Decline,
    Unreachable,
}

/// Per-phase vote counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct Tally {
    pub acks: usize,
    pub declines: usize,
    pub unreachable: usize,
}

impl Tally {
    pub fn record(&mut self, vote: PeerVote) {
        match vote {
            PeerVote::Ack => self.acks += 1,
            PeerVote::Decline => self.declines += 1,
            PeerVote::Unreachable => self.unreachable += 1,
        }
    }

    /// Only acks certify a phase; declines and non-responses do not.
    pub fn has_quorum(&self, needed: usize) -> bool {
        self.acks >= needed
    }
}
