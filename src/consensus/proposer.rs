//! Proposer role: two-phase rounds and the retrying entry point

use crate::consensus::quorum::majority;
use crate::consensus::traits::PeerTransport;
use crate::consensus::types::{
    AcceptRequest, PeerVote, PrepareRequest, ProposalNumber, Tally,
};
use crate::error::ConsensusError;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Drives one consensus round at a time against the fixed peer set.
///
/// The round counter is shared with the owning node so that proposal
/// numbers keep increasing even if the neighbor set is re-installed.
pub struct Proposer {
    node_id: usize,
    counter: Arc<AtomicU64>,
    stride: u64,
    peers: Vec<String>,
    transport: Arc<dyn PeerTransport>,
}

impl Proposer {
    /// `stride` is the proposal-number salt: the cluster size, frozen
    /// by the owning node at first install. Callers must guarantee
    /// `node_id < stride` or numbers can collide across proposers.
    pub fn new(
        node_id: usize,
        peers: Vec<String>,
        transport: Arc<dyn PeerTransport>,
        counter: Arc<AtomicU64>,
        stride: u64,
    ) -> Self {
        Proposer {
            node_id,
            counter,
            stride,
            peers,
            transport,
        }
    }

    fn next_proposal_number(&self) -> ProposalNumber {
        let round = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        round * self.stride + self.node_id as u64
    }

    /// Run one full two-phase round for `value`.
    ///
    /// Returns the value the cluster converged on, which is `value`
    /// unless some acceptor reported an earlier accepted value.
    pub async fn propose(&self, value: &str) -> Result<String, ConsensusError> {
        if self.peers.is_empty() {
            return Err(ConsensusError::PeersNotConfigured);
        }

        let proposal = self.next_proposal_number();
        let needed = majority(self.peers.len());
        info!(
            node = self.node_id,
            proposal,
            value,
            peers = self.peers.len(),
            "starting consensus round"
        );

        // Phase 1: Prepare
        let mut tally = Tally::default();
        let mut highest_accepted: Option<(ProposalNumber, String)> = None;
        for peer in &self.peers {
            let vote = match self.transport.prepare(peer, PrepareRequest { proposal }).await {
                Ok(reply) if reply.ok => {
                    if let (Some(number), Some(accepted)) = (reply.proposal, reply.accepted_value)
                    {
                        if highest_accepted
                            .as_ref()
                            .map_or(true, |(best, _)| number > *best)
                        {
                            highest_accepted = Some((number, accepted));
                        }
                    }
                    PeerVote::Ack
                }
                Ok(_) => PeerVote::Decline,
                Err(err) => {
                    debug!(peer = %peer, error = %err, "prepare: no response");
                    PeerVote::Unreachable
                }
            };
            tally.record(vote);
        }

        if !tally.has_quorum(needed) {
            warn!(
                node = self.node_id,
                proposal,
                acks = tally.acks,
                declines = tally.declines,
                unreachable = tally.unreachable,
                needed,
                "prepare quorum failed"
            );
            return Err(ConsensusError::PrepareQuorumFailed {
                acks: tally.acks,
                needed,
            });
        }

        // Safety rule: a value accepted under the highest-numbered
        // earlier proposal replaces the candidate before Phase 2.
        let chosen = match highest_accepted {
            Some((number, accepted)) => {
                info!(
                    node = self.node_id,
                    proposal,
                    carried_from = number,
                    value = %accepted,
                    "carrying forward previously accepted value"
                );
                accepted
            }
            None => value.to_string(),
        };

        // Phase 2: Accept
        let mut tally = Tally::default();
        for peer in &self.peers {
            let request = AcceptRequest {
                proposal,
                value: chosen.clone(),
            };
            let vote = match self.transport.accept(peer, request).await {
                Ok(reply) if reply.ok => PeerVote::Ack,
                Ok(_) => PeerVote::Decline,
                Err(err) => {
                    debug!(peer = %peer, error = %err, "accept: no response");
                    PeerVote::Unreachable
                }
            };
            tally.record(vote);
        }

        if !tally.has_quorum(needed) {
            warn!(
                node = self.node_id,
                proposal,
                acks = tally.acks,
                needed,
                "accept quorum failed"
            );
            return Err(ConsensusError::AcceptQuorumFailed {
                acks: tally.acks,
                needed,
            });
        }

        info!(node = self.node_id, proposal, value = %chosen, "consensus reached");
        Ok(chosen)
    }

    /// Repeat full rounds until one succeeds or the attempt budget is
    /// spent, sleeping a randomized delay between attempts.
    pub async fn propose_with_retry(
        &self,
        value: &str,
        max_attempts: u32,
    ) -> Result<String, ConsensusError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match self.propose(value).await {
                Ok(chosen) => return Ok(chosen),
                Err(err) => err,
            };

            let retryable = matches!(
                err,
                ConsensusError::PrepareQuorumFailed { .. }
                    | ConsensusError::AcceptQuorumFailed { .. }
            );
            if !retryable {
                return Err(err);
            }
            if attempt >= max_attempts {
                return Err(ConsensusError::RetriesExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = Duration::from_millis(rand::thread_rng().gen_range(200..=1_000));
            warn!(
                node = self.node_id,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "consensus round failed; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
