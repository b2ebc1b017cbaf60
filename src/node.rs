//! Per-node wiring: acceptor + proposer + peer set + fault injection

use crate::consensus::{
    AcceptReply, AcceptRequest, Acceptor, AcceptorState, PeerTransport, PrepareReply,
    PrepareRequest, Proposer,
};
use crate::error::{ConsensusError, StorageError};
use crate::storage::ValueStore;
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Attempt budget for the force-write (retrying) entry point.
pub const FORCE_WRITE_ATTEMPTS: u32 = 5;

/// Delay injected into the acceptor handlers while the timeout toggle
/// is on. Longer than the default transport deadline, so peers observe
/// their calls timing out.
pub const INJECTED_DELAY: Duration = Duration::from_secs(3);

/// Introspection snapshot returned by the `/info` endpoint.
#[derive(Serialize, Debug)]
pub struct NodeInfo {
    pub node_id: usize,
    pub addr: String,
    pub promised: Option<u64>,
    pub accepted_proposal: Option<u64>,
    pub accepted_value: Option<String>,
    pub rounds_started: u64,
    pub stopped: bool,
    pub timeout: bool,
}

/// One consensus node: availability state machine
/// `{Active <-> Stopped} -> Terminated`, the acceptor, and the
/// proposer initialized by `set_neighbors`.
pub struct ConsensusNode {
    node_id: usize,
    addr: String,
    acceptor: Acceptor,
    store: Arc<dyn ValueStore>,
    transport: Arc<dyn PeerTransport>,
    peers: RwLock<Vec<String>>,
    proposer: RwLock<Option<Arc<Proposer>>>,
    round_counter: Arc<AtomicU64>,
    // Proposal-number salt; zero until the first neighbor install
    stride: AtomicU64,
    stopped: AtomicBool,
    delay_injection: AtomicBool,
    terminated: AtomicBool,
}

impl ConsensusNode {
    pub fn new(
        node_id: usize,
        addr: &str,
        store: Arc<dyn ValueStore>,
        transport: Arc<dyn PeerTransport>,
    ) -> Result<Self, ConsensusError> {
        if addr.is_empty() {
            return Err(ConsensusError::Config(
                "node address cannot be empty".to_string(),
            ));
        }

        Ok(ConsensusNode {
            node_id,
            addr: addr.to_string(),
            acceptor: Acceptor::new(node_id, Arc::clone(&store)),
            store,
            transport,
            peers: RwLock::new(Vec::new()),
            proposer: RwLock::new(None),
            round_counter: Arc::new(AtomicU64::new(0)),
            stride: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            delay_injection: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
        })
    }

    /// Install the peer set and (re)initialize the proposer.
    /// Idempotent; the round counter survives re-installation, and the
    /// proposal-number salt is frozen at the first install so numbers
    /// already issued can never be re-emitted.
    pub fn set_neighbors(&self, addresses: Vec<String>) -> Result<(), ConsensusError> {
        if addresses.is_empty() {
            return Err(ConsensusError::Config(
                "neighbor set cannot be empty".to_string(),
            ));
        }
        // node_id must stay below the salt stride or two proposers
        // could generate the same proposal number
        if self.node_id >= addresses.len() {
            return Err(ConsensusError::Config(format!(
                "node id {} does not fit a cluster of {} nodes",
                self.node_id,
                addresses.len()
            )));
        }

        let _ = self.stride.compare_exchange(
            0,
            addresses.len() as u64,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        let stride = self.stride.load(Ordering::SeqCst);

        *self.peers.write() = addresses.clone();
        let proposer = Proposer::new(
            self.node_id,
            addresses,
            Arc::clone(&self.transport),
            Arc::clone(&self.round_counter),
            stride,
        );
        *self.proposer.write() = Some(Arc::new(proposer));
        info!(node = self.node_id, stride, "neighbor set installed");
        Ok(())
    }

    /// Inbound Phase 1. `None` while the node simulates a crash.
    pub fn handle_prepare(&self, request: PrepareRequest) -> Option<PrepareReply> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.acceptor.prepare(request.proposal))
    }

    /// Inbound Phase 2. `None` while the node simulates a crash.
    pub fn handle_accept(&self, request: AcceptRequest) -> Option<AcceptReply> {
        if self.stopped.load(Ordering::SeqCst) {
            return None;
        }
        Some(self.acceptor.accept(request.proposal, &request.value))
    }

    /// One two-phase round for `value`.
    pub async fn propose(&self, value: &str) -> Result<String, ConsensusError> {
        let proposer = self
            .proposer
            .read()
            .clone()
            .ok_or(ConsensusError::PeersNotConfigured)?;
        proposer.propose(value).await
    }

    /// Retrying variant of `propose` backing the ForceWrite operation.
    pub async fn force_write(&self, value: &str) -> Result<String, ConsensusError> {
        let proposer = self
            .proposer
            .read()
            .clone()
            .ok_or(ConsensusError::PeersNotConfigured)?;
        proposer.propose_with_retry(value, FORCE_WRITE_ATTEMPTS).await
    }

    /// Flip the simulated-crash flag; returns the new state.
    pub fn toggle_stop(&self) -> bool {
        let stopped = !self.stopped.load(Ordering::SeqCst);
        self.stopped.store(stopped, Ordering::SeqCst);
        info!(node = self.node_id, stopped, "stop toggled");
        stopped
    }

    /// Flip the delay-injection flag; returns the new state.
    pub fn toggle_timeout(&self) -> bool {
        let timeout = !self.delay_injection.load(Ordering::SeqCst);
        self.delay_injection.store(timeout, Ordering::SeqCst);
        info!(node = self.node_id, timeout, "timeout toggled");
        timeout
    }

    /// Sleep past the peers' call deadline while delay injection is on.
    /// Called by the inbound Prepare/Accept paths.
    pub async fn apply_injected_delay(&self) {
        if self.delay_injection.load(Ordering::SeqCst) {
            tokio::time::sleep(INJECTED_DELAY).await;
        }
    }

    /// One-shot shutdown propagation. Returns `true` only for the call
    /// that actually performed the broadcast; the process exit itself
    /// is owned by the HTTP layer.
    pub async fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            info!(node = self.node_id, "terminate: already terminated");
            return false;
        }

        let peers = self.peers.read().clone();
        for peer in peers {
            if peer == self.addr {
                continue;
            }
            if let Err(err) = self.transport.terminate(&peer).await {
                warn!(node = self.node_id, peer = %peer, error = %err, "terminate propagation failed");
            }
        }
        info!(node = self.node_id, "terminate propagated to peers");
        true
    }

    /// Last durably persisted (proposal, value) pair.
    pub fn read_value(&self) -> Result<(u64, String), StorageError> {
        self.store.load()
    }

    pub fn acceptor_state(&self) -> AcceptorState {
        self.acceptor.snapshot()
    }

    pub fn info(&self) -> NodeInfo {
        let state = self.acceptor.snapshot();
        let (accepted_proposal, accepted_value) = match state.accepted {
            Some((number, value)) => (Some(number), Some(value)),
            None => (None, None),
        };
        NodeInfo {
            node_id: self.node_id,
            addr: self.addr.clone(),
            promised: state.promised,
            accepted_proposal,
            accepted_value,
            rounds_started: self.round_counter.load(Ordering::SeqCst),
            stopped: self.stopped.load(Ordering::SeqCst),
            timeout: self.delay_injection.load(Ordering::SeqCst),
        }
    }

    pub fn node_id(&self) -> usize {
        self.node_id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}
