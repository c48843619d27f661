//! Outbound connector: dials the Hub, performs the registration handshake,
//! then runs the ping responder and work loop.
//!
//! Grounded on `examples/original_source/agent/websocket.go`'s
//! `initWebsocket` for handshake sequencing and `agent/agent.go`'s
//! `RunAgent` for the dial/interrupt shape; the connect-and-split idiom
//! itself follows `examples/Tonksthebear-trybotster/cli/src/ws.rs`'s
//! `connect`.

use std::sync::Arc;

use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::envelope::{split_tungstenite, Envelope, MessageBus, MessageKind, WorkerInfo};
use crate::error::AgentError;

use super::upstream;

/// Dials the Hub's worker-registration endpoint, completes the handshake,
/// and runs until the connection closes, an OS interrupt arrives, or the
/// caller's own `shutdown` token fires.
pub async fn run(config: AgentConfig) -> anyhow::Result<()> {
    run_until(config, CancellationToken::new()).await
}

/// As [`run`], but shutdown can also be triggered programmatically via
/// `shutdown` — used by integration tests to disconnect an agent without
/// sending a real OS signal (spec.md §8 scenario 6).
pub async fn run_until(config: AgentConfig, shutdown: CancellationToken) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let client = reqwest::Client::new();

    let models = upstream::query_models(&client, &config).await?;
    log::info!("available models: {}", models.len());

    let url = format!("ws://{}/internal/v1/worker/ws", config.hub);
    log::info!("connecting to {url}");
    let request = url
        .as_str()
        .into_client_request()
        .map_err(|e| AgentError::Handshake(format!("invalid hub url: {e}")))?;
    let (stream, _response) = tokio_tungstenite::connect_async(request)
        .await
        .map_err(|e| AgentError::Handshake(format!("failed to connect to hub: {e}")))?;
    let (writer, reader) = split_tungstenite(stream);

    let bus = MessageBus::new(Box::new(writer));
    let loop_bus = bus.clone();
    let receive_loop = tokio::spawn(loop_bus.run_receive_loop(Box::new(reader)));

    let cancel = CancellationToken::new();
    if let Err(e) = handshake(&bus, &config, models, &cancel).await {
        log::error!("registration failed: {e}");
        bus.close().await;
        receive_loop.abort();
        return Err(e.into());
    }

    let ping_cancel = cancel.child_token();
    let ping_bus = bus.clone();
    let ping_task = tokio::spawn(async move { run_ping_responder(ping_bus, ping_cancel).await });

    tokio::select! {
        () = run_work_loop(bus.clone(), client, config, cancel.clone()) => {}
        _ = tokio::signal::ctrl_c() => {
            log::info!("interrupt received, closing connection");
        }
        () = shutdown.cancelled() => {
            log::info!("shutdown requested, closing connection");
        }
    }

    cancel.cancel();
    ping_task.abort();
    bus.close().await;
    receive_loop.abort();
    Ok(())
}

async fn handshake(
    bus: &Arc<MessageBus>,
    config: &AgentConfig,
    models: Vec<crate::envelope::Model>,
    cancel: &CancellationToken,
) -> Result<(), AgentError> {
    let server_info = bus
        .receive_by_type(MessageKind::ServerInfo, cancel)
        .await?;
    log::info!("registering to hub: {:?}", server_info.message);

    let worker_info = Envelope::new(
        MessageKind::WorkerInfo,
        serde_json::to_value(WorkerInfo {
            worker_name: config.name.clone(),
            available_models: models,
        })
        .expect("WorkerInfo always serializes"),
    );
    let id = bus.send(&worker_info).await?;

    let ack_frame = bus.receive_by_id(&id, cancel).await?;
    let ack: crate::envelope::Ack = ack_frame
        .parse()
        .map_err(|e| AgentError::Handshake(format!("invalid ack: {e}")))?;
    if !ack.ok {
        return Err(AgentError::Handshake(ack.message));
    }
    log::info!("registered: {}", ack.message);
    Ok(())
}

async fn run_ping_responder(bus: Arc<MessageBus>, cancel: CancellationToken) {
    loop {
        let ping = match bus.receive_by_type(MessageKind::Ping, &cancel).await {
            Ok(frame) => frame,
            Err(_) => return,
        };
        let pong = Envelope::with_id(
            MessageKind::Ack,
            ping.id,
            serde_json::to_value(crate::envelope::Ack::pong()).expect("Ack always serializes"),
        );
        if let Err(e) = bus.send(&pong).await {
            log::warn!("failed to send pong: {e}");
            return;
        }
    }
}

async fn run_work_loop(
    bus: Arc<MessageBus>,
    client: reqwest::Client,
    config: Arc<AgentConfig>,
    cancel: CancellationToken,
) {
    loop {
        let frame = match bus
            .receive_by_type(MessageKind::CompletionsRequest, &cancel)
            .await
        {
            Ok(frame) => frame,
            Err(_) => return,
        };

        let req: crate::envelope::CompletionsRequest = match frame.parse() {
            Ok(req) => req,
            Err(e) => {
                log::warn!("received malformed completions_request: {e}");
                continue;
            }
        };

        log::info!("received completions request {}", frame.id);
        let client = client.clone();
        let config = config.clone();
        let bus = bus.clone();
        let request_id = frame.id.clone();
        tokio::spawn(async move {
            upstream::handle_completions(client, config, bus, request_id.clone(), req).await;
            log::info!("completed request {request_id}");
        });
    }
}
