//! Peer transport seam

use crate::consensus::types::{AcceptReply, AcceptRequest, PrepareReply, PrepareRequest};
use crate::error::TransportError;
use async_trait::async_trait;

/// Delivers one request to one named peer and returns its structured
/// reply, or a `TransportError` when no reply could be obtained.
///
/// Implementations must bound each call with a deadline so that one
/// unreachable peer cannot stall a round.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver a Phase 1 request.
    async fn prepare(
        &self,
        peer: &str,
        request: PrepareRequest,
    ) -> Result<PrepareReply, TransportError>;

    /// Deliver a Phase 2 request.
    async fn accept(&self, peer: &str, request: AcceptRequest)
        -> Result<AcceptReply, TransportError>;

    /// Propagate a shutdown signal to one peer.
    async fn terminate(&self, peer: &str) -> Result<(), TransportError>;
}
