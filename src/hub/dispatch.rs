//! Worker selection and the completions proxy loop.
//!
//! Grounded on spec.md §4.2's "Dispatch for `/v1/completions`" and "Proxy
//! loop" paragraphs, generalizing `examples/original_source/hub/hub.go`'s
//! `RequestCompletions` (which always picked `workers[0]` and retried once
//! on a closed-connection string match) into model-aware least-loaded
//! selection with unbounded retry while the client hasn't seen a byte yet.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::envelope::{CompletionsRequest, CompletionsResponse, Envelope, MessageKind};
use crate::error::{BusError, HubError};

use super::registry::{Registry, WorkerRecord};

/// Picks the least-loaded capable worker from a registry snapshot.
///
/// Ties are broken by first-encountered in snapshot order (spec §4.2: "no
/// stable ordering is required"); `Registry::snapshot` already returns an
/// arbitrary `HashMap` iteration order, so no further randomization is
/// needed to satisfy that.
pub async fn select_worker(
    registry: &Registry,
    model: &str,
) -> Result<Arc<WorkerRecord>, HubError> {
    let snapshot = registry.snapshot().await;
    if snapshot.is_empty() {
        return Err(HubError::NoCapableWorker { model: None });
    }

    let mut best: Option<(Arc<WorkerRecord>, u32)> = None;
    for worker in snapshot {
        if !worker
            .info
            .available_models
            .iter()
            .any(|m| m.id == model)
        {
            continue;
        }
        let load = worker.active_tasks().await;
        match &best {
            Some((_, best_load)) if load >= *best_load => {}
            _ => best = Some((worker, load)),
        }
    }

    best.map(|(worker, _)| worker).ok_or_else(|| HubError::NoCapableWorker {
        model: Some(model.to_string()),
    })
}

/// Output sink for the proxy loop: a place to write response bytes plus a
/// flag tracking whether any have been written yet, which gates whether a
/// worker-loss retry is still legal (spec §4.2's "Retry on worker loss",
/// §9's "Retry after partial write").
pub struct ReplySink {
    tx: tokio::sync::mpsc::Sender<std::io::Result<bytes::Bytes>>,
    bytes_sent: bool,
}

impl ReplySink {
    pub fn new(tx: tokio::sync::mpsc::Sender<std::io::Result<bytes::Bytes>>) -> Self {
        Self {
            tx,
            bytes_sent: false,
        }
    }

    pub fn any_bytes_sent(&self) -> bool {
        self.bytes_sent
    }

    async fn write(&mut self, bytes: bytes::Bytes) -> Result<(), HubError> {
        self.tx
            .send(Ok(bytes))
            .await
            .map_err(|_| HubError::Dispatch(BusError::TransportClosed))?;
        self.bytes_sent = true;
        Ok(())
    }
}

/// Runs the dispatch-and-proxy sequence for one `/v1/completions` request,
/// retrying against a different worker on transport loss until either the
/// request succeeds, the client disappears, or the pool is exhausted.
///
/// `streaming` decides the wire framing of each reply frame: `data: ` / `\n\n`
/// per chunk when `true`, the bare JSON body when `false` (the caller is
/// responsible for having already set the matching HTTP headers before the
/// first call, per spec §4.2 — this function never touches headers).
pub async fn dispatch_completions(
    registry: &Registry,
    req: &CompletionsRequest,
    streaming: bool,
    cancel: &CancellationToken,
    sink: &mut ReplySink,
) -> Result<(), HubError> {
    let worker = select_worker(registry, &req.model).await?;
    worker.increment_tasks().await;
    let result = run_proxy_loop(&worker, req, streaming, cancel, sink).await;
    worker.decrement_tasks().await;

    match result {
        Err(HubError::Dispatch(err)) if err.indicates_peer_gone() && !sink.any_bytes_sent() => {
            registry.unregister(worker.id).await;
            if cancel.is_cancelled() {
                return Err(HubError::Dispatch(BusError::Cancelled));
            }
            Box::pin(dispatch_completions(registry, req, streaming, cancel, sink)).await
        }
        Err(HubError::Dispatch(err)) if err.indicates_peer_gone() => {
            registry.unregister(worker.id).await;
            Ok(())
        }
        other => other,
    }
}

async fn run_proxy_loop(
    worker: &WorkerRecord,
    req: &CompletionsRequest,
    streaming: bool,
    cancel: &CancellationToken,
    sink: &mut ReplySink,
) -> Result<(), HubError> {
    let request_message = serde_json::to_value(req)
        .map_err(|e| HubError::Malformed(format!("failed to re-encode request: {e}")))?;
    let frame = Envelope::new(MessageKind::CompletionsRequest, request_message);
    let id = worker.bus.send(&frame).await?;

    loop {
        let reply = worker.bus.receive_by_id(&id, cancel).await?;
        if reply.kind != MessageKind::CompletionsResponse && reply.kind != MessageKind::CompletionsDone
        {
            return Err(HubError::ProtocolViolation(format!(
                "expected completions_response or completions_done, got {:?}",
                reply.kind
            )));
        }

        if reply.kind == MessageKind::CompletionsDone {
            return Ok(());
        }

        let response: CompletionsResponse = reply
            .parse()
            .map_err(|e| HubError::Malformed(format!("worker sent invalid completion: {e}")))?;
        let body = serde_json::to_vec(&response)
            .map_err(|e| HubError::Malformed(format!("failed to encode reply: {e}")))?;

        let finished = response
            .choices
            .first()
            .is_some_and(|choice| choice.finish_reason.is_some());

        if streaming {
            let mut chunk = Vec::with_capacity(body.len() + 8);
            chunk.extend_from_slice(b"data: ");
            chunk.extend_from_slice(&body);
            chunk.extend_from_slice(b"\n\n");
            sink.write(bytes::Bytes::from(chunk)).await?;
        } else {
            sink.write(bytes::Bytes::from(body)).await?;
            return Ok(());
        }

        if finished {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{MessageBus, Model, WorkerInfo};
    use crate::envelope::transport::TransportWriter;
    use async_trait::async_trait;
    use uuid::Uuid;

    struct NullWriter;

    #[async_trait]
    impl TransportWriter for NullWriter {
        async fn send_text(&mut self, _text: String) -> Result<(), BusError> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    fn model(id: &str) -> Model {
        Model {
            id: id.to_string(),
            object: "model".to_string(),
            created: 0,
            owned_by: "openai".to_string(),
        }
    }

    async fn worker_with(models: Vec<Model>) -> Arc<WorkerRecord> {
        let bus = MessageBus::new(Box::new(NullWriter));
        Arc::new(WorkerRecord::new(
            Uuid::new_v4(),
            WorkerInfo {
                worker_name: "w".to_string(),
                available_models: models,
            },
            bus,
        ))
    }

    #[tokio::test]
    async fn empty_registry_yields_no_capable_worker_with_no_model() {
        let registry = Registry::new();
        let err = select_worker(&registry, "gpt-2").await.unwrap_err();
        assert!(matches!(err, HubError::NoCapableWorker { model: None }));
    }

    #[tokio::test]
    async fn unknown_model_yields_no_capable_worker_with_model_name() {
        let registry = Registry::new();
        registry
            .register(worker_with(vec![model("gpt-2")]).await)
            .await;
        let err = select_worker(&registry, "unknown-model").await.unwrap_err();
        assert!(matches!(err, HubError::NoCapableWorker { model: Some(m) } if m == "unknown-model"));
    }

    #[tokio::test]
    async fn least_loaded_capable_worker_is_chosen() {
        let registry = Registry::new();
        let busy = worker_with(vec![model("gpt-2")]).await;
        busy.increment_tasks().await;
        busy.increment_tasks().await;
        let idle = worker_with(vec![model("gpt-2")]).await;

        registry.register(busy.clone()).await;
        registry.register(idle.clone()).await;

        let chosen = select_worker(&registry, "gpt-2").await.expect("a worker");
        assert_eq!(chosen.id, idle.id);
    }
}
