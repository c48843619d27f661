//! Background liveness probe.
//!
//! Grounded on `examples/original_source/hub/server.go`'s `go hub.PingLoop()`
//! call site for naming/placement; the probe contract itself (5s interval,
//! ping/ack by id, unregister on any failure) is spec.md §4.2's.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::envelope::{Envelope, MessageKind};

use super::Hub;

/// The probe interval is a fixed constant, not configurable (spec §4.2).
const PING_INTERVAL: Duration = Duration::from_secs(5);

/// Runs until `cancel` fires. Wakes every [`PING_INTERVAL`], snapshots the
/// pool, and pings each worker concurrently; any worker that fails to ack
/// in time is unregistered.
pub async fn run(hub: Arc<Hub>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = tokio::time::sleep(PING_INTERVAL) => {}
            () = cancel.cancelled() => return,
        }

        let workers = hub.registry.snapshot().await;
        for worker in workers {
            let hub = hub.clone();
            let cancel = cancel.child_token();
            tokio::spawn(async move {
                let ping = Envelope::new(MessageKind::Ping, json!("ping"));
                let id = match worker.bus.send(&ping).await {
                    Ok(id) => id,
                    Err(_) => {
                        hub.registry.unregister(worker.id).await;
                        return;
                    }
                };

                let reply = tokio::time::timeout(
                    PING_INTERVAL,
                    worker.bus.receive_by_id(&id, &cancel),
                )
                .await;

                match reply {
                    Ok(Ok(frame)) if frame.kind == MessageKind::Ack => {}
                    _ => {
                        log::warn!("worker {} failed liveness probe", worker.id);
                        hub.registry.unregister(worker.id).await;
                    }
                }
            });
        }
    }
}
