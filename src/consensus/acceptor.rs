//! Acceptor role: promise/accept state and decision rules

use crate::consensus::types::{AcceptReply, PrepareReply, ProposalNumber};
use crate::storage::ValueStore;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

/// Durable promise/accept state for one node.
///
/// `None` is the "never promised / never accepted" sentinel.
/// `promised` only ever increases; `accepted.0` never decreases.
#[derive(Debug, Clone, Default)]
pub struct AcceptorState {
    pub promised: Option<ProposalNumber>,
    pub accepted: Option<(ProposalNumber, String)>,
}

/// Answers Prepare/Accept requests for one node. Concurrent calls are
/// serialized by the state mutex so every decision sees a consistent
/// snapshot.
pub struct Acceptor {
    node_id: usize,
    state: Mutex<AcceptorState>,
    store: Arc<dyn ValueStore>,
}

impl Acceptor {
    pub fn new(node_id: usize, store: Arc<dyn ValueStore>) -> Self {
        Acceptor {
            node_id,
            state: Mutex::new(AcceptorState::default()),
            store,
        }
    }

    /// Promise to reject proposals below `proposal`, reporting the
    /// previously accepted pair so the proposer can carry it forward.
    pub fn prepare(&self, proposal: ProposalNumber) -> PrepareReply {
        let mut state = self.state.lock();

        if state.promised.map_or(true, |promised| proposal > promised) {
            state.promised = Some(proposal);
            let (accepted_proposal, accepted_value) = match &state.accepted {
                Some((number, value)) => (Some(*number), Some(value.clone())),
                None => (None, None),
            };
            debug!(node = self.node_id, proposal, "promised");
            PrepareReply {
                ok: true,
                proposal: accepted_proposal,
                accepted_value,
            }
        } else {
            debug!(
                node = self.node_id,
                proposal,
                promised = state.promised,
                "prepare declined"
            );
            PrepareReply {
                ok: false,
                proposal: state.promised,
                accepted_value: None,
            }
        }
    }

    /// Accept `value` under `proposal` unless a higher proposal has
    /// been promised since. The value is persisted before the accept
    /// is acknowledged; a failed durable write declines the request.
    pub fn accept(&self, proposal: ProposalNumber, value: &str) -> AcceptReply {
        let mut state = self.state.lock();

        if state.promised.map_or(false, |promised| proposal < promised) {
            debug!(
                node = self.node_id,
                proposal,
                promised = state.promised,
                "accept declined"
            );
            return AcceptReply {
                ok: false,
                proposal,
            };
        }

        if let Err(err) = self.store.persist(proposal, value) {
            error!(
                node = self.node_id,
                proposal,
                error = %err,
                "durable write failed; declining accept"
            );
            return AcceptReply {
                ok: false,
                proposal,
            };
        }

        state.promised = Some(proposal);
        state.accepted = Some((proposal, value.to_string()));
        debug!(node = self.node_id, proposal, value, "accepted");
        AcceptReply {
            ok: true,
            proposal,
        }
    }

    pub fn snapshot(&self) -> AcceptorState {
        self.state.lock().clone()
    }
}
