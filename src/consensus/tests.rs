//! Tests for the consensus engine over an in-memory cluster

#[cfg(test)]
mod engine_tests {
    use crate::consensus::*;
    use crate::error::{ConsensusError, TransportError};
    use crate::node::ConsensusNode;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::RwLock;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn init() {
        crate::logger::init_test_logger();
    }

    /// Per-call deadline, mirroring the HTTP transport's. Shorter than
    /// the injected delay so a delayed node reads as unreachable.
    const CALL_DEADLINE: std::time::Duration = std::time::Duration::from_millis(200);

    /// Loopback transport: delivers calls directly to registered
    /// nodes. A stopped node answers `None`, surfaced here as a
    /// transport error, exactly as a crashed process would look; a
    /// delayed node runs past the call deadline.
    struct LocalTransport {
        nodes: RwLock<HashMap<String, Arc<ConsensusNode>>>,
        terminate_calls: AtomicUsize,
    }

    impl LocalTransport {
        fn new() -> Arc<Self> {
            Arc::new(LocalTransport {
                nodes: RwLock::new(HashMap::new()),
                terminate_calls: AtomicUsize::new(0),
            })
        }

        fn register(&self, addr: &str, node: Arc<ConsensusNode>) {
            self.nodes.write().insert(addr.to_string(), node);
        }

        fn node(&self, peer: &str) -> Result<Arc<ConsensusNode>, TransportError> {
            self.nodes
                .read()
                .get(peer)
                .cloned()
                .ok_or_else(|| TransportError {
                    peer: peer.to_string(),
                    reason: "connection refused".to_string(),
                })
        }

        fn stopped_error(peer: &str) -> TransportError {
            TransportError {
                peer: peer.to_string(),
                reason: "node stopped".to_string(),
            }
        }

        fn deadline_error(peer: &str) -> TransportError {
            TransportError {
                peer: peer.to_string(),
                reason: "call deadline exceeded".to_string(),
            }
        }
    }

    #[async_trait]
    impl PeerTransport for LocalTransport {
        async fn prepare(
            &self,
            peer: &str,
            request: PrepareRequest,
        ) -> Result<PrepareReply, TransportError> {
            // Yield so concurrent rounds interleave like real I/O
            tokio::task::yield_now().await;
            let node = self.node(peer)?;
            let reply = tokio::time::timeout(CALL_DEADLINE, async {
                node.apply_injected_delay().await;
                node.handle_prepare(request)
            })
            .await
            .map_err(|_| Self::deadline_error(peer))?;
            reply.ok_or_else(|| Self::stopped_error(peer))
        }

        async fn accept(
            &self,
            peer: &str,
            request: AcceptRequest,
        ) -> Result<AcceptReply, TransportError> {
            tokio::task::yield_now().await;
            let node = self.node(peer)?;
            let reply = tokio::time::timeout(CALL_DEADLINE, async {
                node.apply_injected_delay().await;
                node.handle_accept(request)
            })
            .await
            .map_err(|_| Self::deadline_error(peer))?;
            reply.ok_or_else(|| Self::stopped_error(peer))
        }

        async fn terminate(&self, _peer: &str) -> Result<(), TransportError> {
            self.terminate_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn build_cluster(size: usize) -> (Arc<LocalTransport>, Vec<Arc<ConsensusNode>>) {
        let transport = LocalTransport::new();
        let addresses: Vec<String> = (0..size).map(|i| format!("127.0.0.1:{}", 9100 + i)).collect();

        let mut nodes = Vec::with_capacity(size);
        for (id, addr) in addresses.iter().enumerate() {
            let node = Arc::new(
                ConsensusNode::new(
                    id,
                    addr,
                    Arc::new(MemoryStore::new()),
                    Arc::clone(&transport) as Arc<dyn PeerTransport>,
                )
                .unwrap(),
            );
            transport.register(addr, Arc::clone(&node));
            nodes.push(node);
        }
        for node in &nodes {
            node.set_neighbors(addresses.clone()).unwrap();
        }
        (transport, nodes)
    }

    fn count_accepting(nodes: &[Arc<ConsensusNode>], value: &str) -> usize {
        nodes
            .iter()
            .filter(|node| {
                node.acceptor_state()
                    .accepted
                    .map_or(false, |(_, accepted)| accepted == value)
            })
            .count()
    }

    #[test]
    fn test_tally_three_valued_counting() {
        init();
        let mut tally = Tally::default();
        tally.record(PeerVote::Ack);
        tally.record(PeerVote::Ack);
        tally.record(PeerVote::Decline);
        tally.record(PeerVote::Unreachable);
        tally.record(PeerVote::Unreachable);

        assert_eq!(tally.acks, 2);
        assert_eq!(tally.declines, 1);
        assert_eq!(tally.unreachable, 2);
        // Only acks certify: 5 peers answered but quorum needs 3 acks
        assert!(tally.has_quorum(2));
        assert!(!tally.has_quorum(3));
    }

    #[tokio::test]
    async fn test_healthy_cluster_reaches_consensus() {
        init();
        let (_transport, nodes) = build_cluster(3);

        let result = nodes[0].propose("hello").await.unwrap();
        assert_eq!(result, "hello");
        assert!(count_accepting(&nodes, "hello") >= 2);
    }

    #[tokio::test]
    async fn test_value_carry_forward_overrides_candidate() {
        init();
        let (_transport, nodes) = build_cluster(3);

        // Node 0 already accepted "X" under an earlier proposal
        let seeded = nodes[0]
            .handle_accept(AcceptRequest {
                proposal: 2,
                value: "X".to_string(),
            })
            .unwrap();
        assert!(seeded.ok);

        // A later round proposing "Y" must converge on "X" instead
        let result = nodes[1].propose("Y").await.unwrap();
        assert_eq!(result, "X");
        assert!(count_accepting(&nodes, "X") >= 2);
        assert_eq!(count_accepting(&nodes, "Y"), 0);
    }

    #[tokio::test]
    async fn test_minority_stopped_nodes_are_tolerated() {
        init();
        let (_transport, nodes) = build_cluster(5);

        nodes[3].toggle_stop();
        nodes[4].toggle_stop();

        let result = nodes[0].propose("survives").await.unwrap();
        assert_eq!(result, "survives");
        assert_eq!(count_accepting(&nodes, "survives"), 3);
    }

    #[tokio::test]
    async fn test_majority_stopped_nodes_fail_prepare_quorum() {
        init();
        let (_transport, nodes) = build_cluster(3);

        nodes[1].toggle_stop();
        nodes[2].toggle_stop();

        match nodes[0].propose("doomed").await {
            Err(ConsensusError::PrepareQuorumFailed { acks, needed }) => {
                assert_eq!(acks, 1);
                assert_eq!(needed, 2);
            }
            other => panic!("expected prepare quorum failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_toggle_stop_restores_responsiveness() {
        init();
        let (_transport, nodes) = build_cluster(3);

        nodes[1].toggle_stop();
        nodes[2].toggle_stop();
        assert!(nodes[0].propose("first").await.is_err());

        // Two toggles per node restore the original availability
        nodes[1].toggle_stop();
        nodes[2].toggle_stop();
        let result = nodes[0].propose("second").await.unwrap();
        assert_eq!(result, "second");
    }

    #[tokio::test]
    async fn test_unknown_peer_counts_as_non_response() {
        init();
        let transport = LocalTransport::new();
        let addresses: Vec<String> = vec![
            "127.0.0.1:9400".to_string(),
            "127.0.0.1:9401".to_string(),
            "127.0.0.1:9402".to_string(),
        ];
        // Only two of the three peers exist
        let mut nodes = Vec::new();
        for (id, addr) in addresses.iter().take(2).enumerate() {
            let node = Arc::new(
                ConsensusNode::new(
                    id,
                    addr,
                    Arc::new(MemoryStore::new()),
                    Arc::clone(&transport) as Arc<dyn PeerTransport>,
                )
                .unwrap(),
            );
            transport.register(addr, Arc::clone(&node));
            node.set_neighbors(addresses.clone()).unwrap();
            nodes.push(node);
        }

        // Two reachable acceptors out of three still make a majority
        let result = nodes[0].propose("partial").await.unwrap();
        assert_eq!(result, "partial");
    }

    #[tokio::test]
    async fn test_delayed_node_is_seen_as_unreachable() {
        init();
        let (_transport, nodes) = build_cluster(3);

        // The delayed node's calls run past the transport deadline;
        // the round must still land on the remaining majority
        nodes[2].toggle_timeout();

        let result = nodes[0].propose("on-time").await.unwrap();
        assert_eq!(result, "on-time");
        assert!(nodes[2].acceptor_state().accepted.is_none());
        assert_eq!(count_accepting(&nodes, "on-time"), 2);

        // Toggling back restores the node as a voter
        nodes[2].toggle_timeout();
        nodes[0].propose("again").await.unwrap();
        assert!(nodes[2].acceptor_state().accepted.is_some());
    }

    #[tokio::test]
    async fn test_stride_frozen_across_neighbor_reinstall() {
        init();
        let (_transport, nodes) = build_cluster(3);

        for value in ["a", "b", "c", "d"] {
            nodes[0].propose(value).await.unwrap();
        }
        let promised_before = nodes[1].acceptor_state().promised.unwrap();

        // Re-installing a smaller neighbor set must not shrink the
        // salt stride, or the next number could fall below ones
        // already issued
        let subset: Vec<String> = (0..2).map(|i| format!("127.0.0.1:{}", 9100 + i)).collect();
        nodes[0].set_neighbors(subset).unwrap();

        nodes[0].propose("e").await.unwrap();
        let promised_after = nodes[1].acceptor_state().promised.unwrap();
        assert!(promised_after > promised_before);
    }

    #[tokio::test]
    async fn test_retry_budget_exhaustion_is_terminal() {
        init();
        let (transport, nodes) = build_cluster(3);
        nodes[1].toggle_stop();
        nodes[2].toggle_stop();

        let addresses: Vec<String> = (0..3).map(|i| format!("127.0.0.1:{}", 9100 + i)).collect();
        let proposer = Proposer::new(
            0,
            addresses,
            Arc::clone(&transport) as Arc<dyn PeerTransport>,
            Arc::new(AtomicU64::new(0)),
            3,
        );

        match proposer.propose_with_retry("never", 2).await {
            Err(ConsensusError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(
                    *last,
                    ConsensusError::PrepareQuorumFailed { .. }
                ));
            }
            other => panic!("expected retry exhaustion, got {:?}", other),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_proposers_agree_on_one_value() {
        init();
        let (_transport, nodes) = build_cluster(5);

        let mut handles = Vec::new();
        for (id, node) in nodes.iter().enumerate() {
            let node = Arc::clone(node);
            let value = format!("value-{}", id);
            handles.push(tokio::spawn(
                async move { node.force_write(&value).await },
            ));
        }

        let mut successes = Vec::new();
        for handle in handles {
            if let Ok(Ok(value)) = handle.await {
                successes.push(value);
            }
        }

        // At least one round must land, and every successful round
        // must have converged on the same value.
        assert!(!successes.is_empty());
        let chosen = &successes[0];
        assert!(successes.iter().all(|value| value == chosen));

        // No second value may reach accept quorum on the acceptors
        let needed = majority(nodes.len());
        for id in 0..nodes.len() {
            let value = format!("value-{}", id);
            if &value != chosen {
                assert!(count_accepting(&nodes, &value) < needed);
            }
        }
        assert!(count_accepting(&nodes, chosen) >= needed);
    }

    #[tokio::test]
    async fn test_proposal_numbers_increase_across_rounds() {
        init();
        let (_transport, nodes) = build_cluster(3);

        nodes[0].propose("a").await.unwrap();
        nodes[0].propose("b").await.unwrap();
        let info = nodes[0].info();
        assert_eq!(info.rounds_started, 2);

        // Later rounds never regress below the promise they installed
        let state = nodes[1].acceptor_state();
        let promised = state.promised.unwrap();
        let reply = nodes[1]
            .handle_prepare(PrepareRequest { proposal: promised })
            .unwrap();
        assert!(!reply.ok);
    }

    #[tokio::test]
    async fn test_stopped_acceptor_state_is_untouched() {
        init();
        let (_transport, nodes) = build_cluster(3);

        nodes[2].toggle_stop();
        nodes[0].propose("quiet").await.unwrap();

        // The stopped node saw nothing; the others hold the value
        assert!(nodes[2].acceptor_state().accepted.is_none());
        assert_eq!(count_accepting(&nodes, "quiet"), 2);
    }
}
