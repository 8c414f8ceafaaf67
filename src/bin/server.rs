//! # bayeskernel worker server
//!
//! Exposes the §6 worker message protocol over a WebSocket: a client sends
//! a `COMPUTE_MARGINALS`/`COMPUTE_SENSITIVITY` request carrying a full
//! variable-set snapshot, the server runs it through [`InferenceService`]
//! and replies with the matching result (or an `ERROR` envelope).
//!
//! When `[inference].offload = true` (the default, §5), requests are
//! handed to a dedicated OS thread over a `crossbeam-channel` rather than
//! run inline on the Tokio task handling the socket — the inference plane
//! stays off the async runtime's worker threads even though the sampling
//! passes it runs are CPU-bound and long.
//!
//! ```bash
//! cargo run --bin bayeskernel-server
//! ```

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use bayeskernel::config::Config;
use bayeskernel::cpt::CptEntry;
use bayeskernel::inference_service::{self, InferenceService};
use bayeskernel::protocol::error::WireError;
use bayeskernel::protocol::wire::{InterventionResult, WireVariable, WorkerRequest, WorkerResponse};
use bayeskernel::store::VariableRecord;
use bayeskernel::KernelError;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{oneshot, Semaphore};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

/// A pending worker request and the channel to carry its response back to
/// the Tokio task that accepted it.
struct OffloadJob {
    request: WorkerRequest,
    reply: oneshot::Sender<WorkerResponse>,
}

/// A handle to the dedicated inference-plane thread.
struct OffloadHandle {
    sender: crossbeam_channel::Sender<OffloadJob>,
}

/// Spawn the inference plane on its own OS thread, grounded on the §5
/// "offload worker" design: one long-lived thread owns the
/// [`InferenceService`] and drains jobs off an unbounded `crossbeam-channel`
/// until the sender side is dropped.
fn spawn_offload_worker(service: InferenceService) -> OffloadHandle {
    let (sender, receiver) = crossbeam_channel::unbounded::<OffloadJob>();
    std::thread::Builder::new()
        .name("bayeskernel-inference".to_string())
        .spawn(move || {
            for job in receiver {
                let response = handle_request(&service, job.request);
                let _ = job.reply.send(response);
            }
        })
        .expect("failed to spawn inference-plane thread");
    OffloadHandle { sender }
}

enum InferencePlane {
    Inline(InferenceService),
    Offload(OffloadHandle),
}

impl InferencePlane {
    async fn dispatch(&self, request: WorkerRequest) -> WorkerResponse {
        match self {
            InferencePlane::Inline(service) => handle_request(service, request),
            InferencePlane::Offload(handle) => {
                let request_id = request_id_of(&request).to_string();
                let (reply, rx) = oneshot::channel();
                if handle.sender.send(OffloadJob { request, reply }).is_err() {
                    return error_string(request_id, "inference plane thread has shut down");
                }
                rx.await
                    .unwrap_or_else(|_| error_string(request_id, "inference plane dropped the request"))
            }
        }
    }
}

fn request_id_of(request: &WorkerRequest) -> &str {
    match request {
        WorkerRequest::ComputeMarginals { request_id, .. } | WorkerRequest::ComputeSensitivity { request_id, .. } => {
            request_id
        }
    }
}

struct AppState {
    plane: InferencePlane,
    connections: Arc<Semaphore>,
}

#[tokio::main]
async fn main() {
    let config = Config::load().unwrap_or_default();
    config.logging.init();
    let bind_address = config.server.bind_address.clone();
    let body_limit = config.server.body_limit_bytes;
    let max_connections = config.server.max_connections;
    let offload = config.inference.offload;

    let service = InferenceService::new(config.inference);
    let plane = if offload {
        InferencePlane::Offload(spawn_offload_worker(service))
    } else {
        InferencePlane::Inline(service)
    };

    let state = Arc::new(AppState {
        plane,
        connections: Arc::new(Semaphore::new(max_connections)),
    });

    let app = build_router(state, body_limit);

    info!(%bind_address, max_connections, offload, "bayeskernel-server listening");
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .expect("failed to bind server address");
    axum::serve(listener, app).await.expect("server error");
}

/// Assembled separately from `main` so tests can drive the router with
/// `tower::ServiceExt::oneshot` instead of binding a real listener.
fn build_router(state: Arc<AppState>, body_limit: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let Ok(permit) = state.connections.clone().try_acquire_owned() else {
        warn!("connection limit reached, dropping socket");
        let _ = socket.close().await;
        return;
    };

    while let Some(Ok(message)) = socket.recv().await {
        let Message::Text(text) = message else {
            continue;
        };
        let response = match serde_json::from_str::<WorkerRequest>(&text) {
            Ok(request) => state.plane.dispatch(request).await,
            Err(e) => WorkerResponse::Error {
                request_id: String::new(),
                error: format!("malformed request: {e}"),
            },
        };
        let Ok(payload) = serde_json::to_string(&response) else {
            error!("failed to serialize worker response");
            continue;
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            break;
        }
    }

    drop(permit);
}

fn error_string(request_id: String, message: &str) -> WorkerResponse {
    WorkerResponse::Error {
        request_id,
        error: message.to_string(),
    }
}

fn handle_request(service: &InferenceService, request: WorkerRequest) -> WorkerResponse {
    match request {
        WorkerRequest::ComputeMarginals {
            request_id,
            nodes,
            intervention_node_id,
        } => {
            let snapshot = build_snapshot(&nodes);
            match intervention_node_id {
                Some(node_id) => {
                    match service.compute_marginals_with_intervention(&snapshot, &node_id, &request_id) {
                        Ok(Some((true_case, false_case))) => WorkerResponse::MarginalsResult {
                            request_id,
                            probabilities: None,
                            intervention_result: Some(InterventionResult {
                                true_case: to_wire_map(&true_case),
                                false_case: to_wire_map(&false_case),
                            }),
                        },
                        Ok(None) => superseded(request_id),
                        Err(e) => error_response(request_id, &e),
                    }
                }
                None => match service.compute_marginals(&snapshot, &request_id) {
                    Ok(Some(marginals)) => WorkerResponse::MarginalsResult {
                        request_id,
                        probabilities: Some(to_wire_map(&marginals)),
                        intervention_result: None,
                    },
                    Ok(None) => superseded(request_id),
                    Err(e) => error_response(request_id, &e),
                },
            }
        }
        WorkerRequest::ComputeSensitivity {
            request_id,
            nodes,
            target,
        } => {
            let snapshot = build_snapshot(&nodes);
            match service.compute_sensitivity(&snapshot, &target, &request_id, |_| {}) {
                Ok(Some(scores)) => WorkerResponse::SensitivityResult {
                    request_id,
                    scores: scores.into_iter().map(Into::into).collect(),
                },
                Ok(None) => superseded(request_id),
                Err(e) => error_response(request_id, &e),
            }
        }
    }
}

fn build_snapshot(wire_nodes: &[WireVariable]) -> Vec<inference_service::InferenceNode> {
    let records: Vec<VariableRecord> = wire_nodes
        .iter()
        .map(|w| VariableRecord {
            id: w.id.clone(),
            model_id: w.model_id.clone(),
            title: w.title.clone(),
            description: w.description.clone(),
            x: w.x,
            y: w.y,
            cpt: w.cpt_entries.iter().map(CptEntry::from).collect(),
            column_order: w.column_order.clone(),
            version: 0,
        })
        .collect();
    inference_service::snapshot(&records)
}

fn to_wire_map(marginals: &bayeskernel::sampling::Marginals) -> BTreeMap<bayeskernel::NodeId, f64> {
    marginals.0.iter().map(|(id, p)| (id.clone(), *p)).collect()
}

fn superseded(request_id: String) -> WorkerResponse {
    WorkerResponse::Error {
        request_id,
        error: "superseded by a later request".to_string(),
    }
}

fn error_response(request_id: String, error: &KernelError) -> WorkerResponse {
    let wire: WireError = error.into();
    WorkerResponse::Error {
        request_id,
        error: wire.message,
    }
}
