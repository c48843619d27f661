//! HTTP ingress handlers (spec.md §4.4).
//!
//! Grounded on `examples/original_source/hub/server.go`'s route table
//! (`/`, `/v1/completions`, `/internal/v1/worker/ws`, `/internal/v1/workers`)
//! and `hub/worker.go`'s `handleWorkerWS` for the registration handshake
//! sequencing; rebuilt on `axum` (sourced, per DESIGN.md, from
//! `examples/eriktaubeneck-raw-ipa/ipa-core`'s dependency table since the
//! teacher never used an HTTP server framework).

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::envelope::{
    split_axum, Ack, CompletionsRequest, Envelope, ListModelsResponse, MessageBus, MessageKind,
    ServerInfo, WorkerInfo,
};
use crate::error::HubError;

use super::dispatch::{dispatch_completions, ReplySink};
use super::registry::WorkerRecord;
use super::Hub;

const INDEX_HTML: &str = include_str!("../../assets/index.html");

pub async fn index() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/html")], INDEX_HTML)
}

pub async fn list_models(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    Json(ListModelsResponse::new(hub.registry.model_index().await))
}

#[derive(Serialize)]
struct WorkerSummary {
    id: Uuid,
    info: WorkerInfo,
}

pub async fn list_workers(State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    let summaries: Vec<WorkerSummary> = hub
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|w| WorkerSummary {
            id: w.id,
            info: w.info.clone(),
        })
        .collect();
    Json(summaries)
}

pub async fn completions(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<CompletionsRequest>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Json(req) = match body {
        Ok(req) => req,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                format!("Failed to parse request: {e}"),
            )
                .into_response()
        }
    };

    let streaming = req.stream;

    // Resolve the capable-worker question up front, synchronously, so an
    // empty or model-less pool produces the 503 spec §4.2 requires before
    // any response headers are decided. The dispatch task below reselects
    // once it actually runs; a worker that vanishes between this check and
    // the real dispatch is just the ordinary retry-on-worker-loss path.
    if let Err(err) = super::dispatch::select_worker(&hub.registry, &req.model).await {
        return hub_error_response(err);
    }

    let (tx, rx) = mpsc::channel::<std::io::Result<bytes::Bytes>>(16);

    // Cancellation for this one request, not the Hub's process-wide shutdown
    // token (spec §5: an abandoned client must unwind the reply loop's
    // `ReceiveById`). The response body's mpsc receiver is dropped the
    // moment the HTTP client goes away, so watching `tx.closed()` is the
    // client-disconnect signal.
    let cancel = CancellationToken::new();
    let watcher_cancel = cancel.clone();
    let watcher_tx = tx.clone();
    tokio::spawn(async move {
        watcher_tx.closed().await;
        watcher_cancel.cancel();
    });

    tokio::spawn(async move {
        let mut sink = ReplySink::new(tx);
        if let Err(err) = dispatch_completions(&hub.registry, &req, streaming, &cancel, &mut sink).await
        {
            log::warn!("completions request ended with an error: {err}");
        }
    });

    build_response(streaming, rx).await
}

fn hub_error_response(err: HubError) -> Response {
    match err {
        HubError::NoCapableWorker { model: Some(_) } => {
            (StatusCode::SERVICE_UNAVAILABLE, "No workers available for model").into_response()
        }
        HubError::NoCapableWorker { model: None } => {
            (StatusCode::SERVICE_UNAVAILABLE, "No workers available").into_response()
        }
        other => {
            log::error!("dispatch failed: {other}");
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
        }
    }
}

async fn build_response(
    streaming: bool,
    rx: mpsc::Receiver<std::io::Result<bytes::Bytes>>,
) -> Response {
    let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
    let body = Body::from_stream(stream);
    let mut response = Response::builder().status(StatusCode::OK);
    response = response.header(header::CACHE_CONTROL, "no-cache");
    if streaming {
        response = response
            .header(header::CONTENT_TYPE, "text/event-stream")
            .header(header::CONNECTION, "keep-alive");
    } else {
        response = response.header(header::CONTENT_TYPE, "application/json");
    }
    response.body(body).expect("response builder is infallible here")
}

pub async fn worker_ws(
    State(hub): State<Arc<Hub>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_worker_socket(hub, socket))
}

/// Server-side registration handshake (spec §4.2's "Worker handshake"):
/// construct the bus, send `server_info`, await `worker_info` by type,
/// mint an id, register, then ack. Any failure aborts before the worker
/// enters the registry.
async fn handle_worker_socket(hub: Arc<Hub>, socket: WebSocket) {
    log::info!("incoming worker websocket connection");
    let (writer, reader) = split_axum(socket);
    let bus = MessageBus::new(Box::new(writer));
    let loop_bus = bus.clone();
    let receive_loop = tokio::spawn(loop_bus.run_receive_loop(Box::new(reader)));

    match register_worker(&hub, &bus).await {
        Ok(worker_id) => {
            // The close-handler spec §4.2 calls for: once the receive loop
            // ends (peer closed the transport or a read failed), unregister
            // the worker. `Registry::unregister` is idempotent, so this
            // races harmlessly with a liveness-probe or dispatch-path
            // unregister of the same id.
            tokio::spawn(async move {
                let _ = receive_loop.await;
                hub.registry.unregister(worker_id).await;
            });
        }
        Err(e) => {
            log::warn!("worker registration failed: {e}");
            bus.close().await;
            receive_loop.abort();
        }
    }
}

async fn register_worker(hub: &Arc<Hub>, bus: &Arc<MessageBus>) -> Result<Uuid, HubError> {
    let welcome = Envelope::new(
        MessageKind::ServerInfo,
        serde_json::to_value(ServerInfo {
            server_name: "routehub".to_string(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            message: "Welcome to routehub".to_string(),
        })
        .expect("ServerInfo always serializes"),
    );
    bus.send(&welcome).await?;

    let cancel = hub.cancel.child_token();
    let info_frame = bus
        .receive_by_type(MessageKind::WorkerInfo, &cancel)
        .await?;
    let info: WorkerInfo = info_frame
        .parse()
        .map_err(|e| HubError::ProtocolViolation(format!("invalid worker_info: {e}")))?;

    let worker_id = Uuid::new_v4();
    let record = Arc::new(WorkerRecord::new(worker_id, info.clone(), bus.clone()));
    hub.registry.register(record).await;
    log::info!("registered worker {worker_id} ({})", info.worker_name);

    let ack = Envelope::with_id(
        MessageKind::Ack,
        info_frame.id,
        serde_json::to_value(Ack::ok(worker_id.to_string())).expect("Ack always serializes"),
    );
    bus.send(&ack).await?;
    Ok(worker_id)
}
