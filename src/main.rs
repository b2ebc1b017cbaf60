use rust_paxos_store::logger;
use rust_paxos_store::network::{start_server, HttpPeerTransport, DEFAULT_CALL_TIMEOUT};
use rust_paxos_store::node::ConsensusNode;
use rust_paxos_store::storage::SqliteStore;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

fn io_err<E: std::fmt::Display>(err: E) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    logger::init_logger();

    let args: Vec<String> = env::args().collect();
    let node_id: usize = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .or_else(|| env::var("NODE_ID").ok().and_then(|s| s.parse().ok()))
        .unwrap_or(0);
    let addr = args
        .get(2)
        .cloned()
        .or_else(|| env::var("NODE_ADDR").ok())
        .unwrap_or_else(|| format!("127.0.0.1:{}", 8000 + node_id));
    let db_path = env::var("DB_PATH").unwrap_or_else(|_| format!("paxos_node_{}.db", node_id));
    let call_timeout = env::var("RPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_CALL_TIMEOUT);

    let store = SqliteStore::new(&db_path).map_err(io_err)?;
    store.init().map_err(io_err)?;

    let transport = HttpPeerTransport::new(call_timeout).map_err(io_err)?;
    let node = Arc::new(
        ConsensusNode::new(node_id, &addr, Arc::new(store), Arc::new(transport))
            .map_err(io_err)?,
    );

    info!(
        node_id,
        addr = %addr,
        db = %db_path,
        call_timeout_ms = call_timeout.as_millis() as u64,
        "node starting"
    );

    start_server(&addr, node).await
}
