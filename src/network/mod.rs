//! HTTP remote surface and peer transport
//!
//! Every remote operation of a node is a JSON-over-HTTP endpoint;
//! peers call each other through `HttpPeerTransport`, which bounds
//! every call with a deadline so an unreachable peer costs at most one
//! timeout per phase.

use crate::consensus::{AcceptReply, AcceptRequest, PeerTransport, PrepareReply, PrepareRequest};
use crate::error::{ConsensusError, StorageError, TransportError};
use crate::node::ConsensusNode;
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Default per-call deadline for peer requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ProposeRequest {
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SetNeighborsRequest {
    pub addresses: Vec<String>,
}

/// reqwest-backed transport; one client shared across all peers.
pub struct HttpPeerTransport {
    client: reqwest::Client,
}

impl HttpPeerTransport {
    pub fn new(call_timeout: Duration) -> Result<Self, ConsensusError> {
        let client = reqwest::Client::builder()
            .timeout(call_timeout)
            .build()
            .map_err(|err| ConsensusError::Config(format!("http client: {}", err)))?;
        Ok(HttpPeerTransport { client })
    }

    async fn post_json<Req, Resp>(
        &self,
        peer: &str,
        path: &str,
        body: &Req,
    ) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{}/{}", peer, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|err| TransportError {
                peer: peer.to_string(),
                reason: err.to_string(),
            })?;

        // A stopped node answers 503; treat it like any non-response.
        if !response.status().is_success() {
            return Err(TransportError {
                peer: peer.to_string(),
                reason: format!("HTTP status {}", response.status()),
            });
        }

        response.json::<Resp>().await.map_err(|err| TransportError {
            peer: peer.to_string(),
            reason: format!("decode error: {}", err),
        })
    }
}

#[async_trait]
impl PeerTransport for HttpPeerTransport {
    async fn prepare(
        &self,
        peer: &str,
        request: PrepareRequest,
    ) -> Result<PrepareReply, TransportError> {
        self.post_json(peer, "prepare", &request).await
    }

    async fn accept(
        &self,
        peer: &str,
        request: AcceptRequest,
    ) -> Result<AcceptReply, TransportError> {
        self.post_json(peer, "accept", &request).await
    }

    async fn terminate(&self, peer: &str) -> Result<(), TransportError> {
        let url = format!("http://{}/terminate", peer);
        self.client
            .post(&url)
            .send()
            .await
            .map_err(|err| TransportError {
                peer: peer.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }
}

/// HTTP endpoint: Phase 1
async fn prepare(
    request: web::Json<PrepareRequest>,
    node: web::Data<Arc<ConsensusNode>>,
) -> impl Responder {
    node.apply_injected_delay().await;
    match node.handle_prepare(request.into_inner()) {
        Some(reply) => HttpResponse::Ok().json(reply),
        None => HttpResponse::ServiceUnavailable().json(json!({"error": "node stopped"})),
    }
}

/// HTTP endpoint: Phase 2
async fn accept(
    request: web::Json<AcceptRequest>,
    node: web::Data<Arc<ConsensusNode>>,
) -> impl Responder {
    node.apply_injected_delay().await;
    match node.handle_accept(request.into_inner()) {
        Some(reply) => HttpResponse::Ok().json(reply),
        None => HttpResponse::ServiceUnavailable().json(json!({"error": "node stopped"})),
    }
}

/// HTTP endpoint: run one consensus round
async fn propose(
    request: web::Json<ProposeRequest>,
    node: web::Data<Arc<ConsensusNode>>,
) -> impl Responder {
    match node.propose(&request.value).await {
        Ok(value) => HttpResponse::Ok().json(json!({"value": value})),
        Err(err) => HttpResponse::Conflict().json(json!({"error": err.to_string()})),
    }
}

/// HTTP endpoint: consensus round with bounded retries
async fn force_write(
    request: web::Json<ProposeRequest>,
    node: web::Data<Arc<ConsensusNode>>,
) -> impl Responder {
    match node.force_write(&request.value).await {
        Ok(value) => HttpResponse::Ok().json(json!({"value": value})),
        Err(err) => HttpResponse::Conflict().json(json!({"error": err.to_string()})),
    }
}

async fn toggle_stop(node: web::Data<Arc<ConsensusNode>>) -> impl Responder {
    HttpResponse::Ok().json(json!({"stopped": node.toggle_stop()}))
}

async fn toggle_timeout(node: web::Data<Arc<ConsensusNode>>) -> impl Responder {
    HttpResponse::Ok().json(json!({"timeout": node.toggle_timeout()}))
}

/// HTTP endpoint: propagate shutdown to peers, then exit the process.
/// The broadcast runs at most once regardless of how often this is hit.
async fn terminate(node: web::Data<Arc<ConsensusNode>>) -> impl Responder {
    let node = node.get_ref().clone();
    actix_rt::spawn(async move {
        node.terminate().await;
        // Give the 200 reply a moment to flush before exiting
        tokio::time::sleep(Duration::from_millis(100)).await;
        info!(node = node.node_id(), "terminating process");
        std::process::exit(0);
    });
    HttpResponse::Ok().finish()
}

async fn health() -> impl Responder {
    HttpResponse::Ok().json(json!({"status": "OK"}))
}

async fn set_neighbors(
    request: web::Json<SetNeighborsRequest>,
    node: web::Data<Arc<ConsensusNode>>,
) -> impl Responder {
    match node.set_neighbors(request.into_inner().addresses) {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => HttpResponse::BadRequest().json(json!({"error": err.to_string()})),
    }
}

async fn read_value(node: web::Data<Arc<ConsensusNode>>) -> impl Responder {
    match node.read_value() {
        Ok((proposal, value)) => {
            HttpResponse::Ok().json(json!({"proposal": proposal, "value": value}))
        }
        Err(StorageError::Empty) => {
            HttpResponse::NotFound().json(json!({"error": "no value persisted yet"}))
        }
        Err(err) => {
            error!(error = %err, "read failed");
            HttpResponse::InternalServerError().json(json!({"error": err.to_string()}))
        }
    }
}

async fn node_info(node: web::Data<Arc<ConsensusNode>>) -> impl Responder {
    HttpResponse::Ok().json(node.info())
}

/// Start the node's HTTP server; blocks until shutdown.
pub async fn start_server(addr: &str, node: Arc<ConsensusNode>) -> std::io::Result<()> {
    let node_data = web::Data::new(node);

    info!(addr, "starting node HTTP server");

    HttpServer::new(move || {
        App::new()
            .app_data(node_data.clone())
            .route("/prepare", web::post().to(prepare))
            .route("/accept", web::post().to(accept))
            .route("/propose", web::post().to(propose))
            .route("/force-write", web::post().to(force_write))
            .route("/toggle-stop", web::post().to(toggle_stop))
            .route("/toggle-timeout", web::post().to(toggle_timeout))
            .route("/terminate", web::post().to(terminate))
            .route("/neighbors", web::post().to(set_neighbors))
            .route("/health", web::get().to(health))
            .route("/read", web::get().to(read_value))
            .route("/info", web::get().to(node_info))
    })
    .bind(addr)?
    .run()
    .await
}
