//! Worker registry: the Hub's mapping from a freshly minted worker id to its
//! record, guarded by a single mutex.
//!
//! Grounded on `examples/original_source/hub/server.go`'s
//! `map[uuid.UUID]*Worker` (the move from the original's bare `[]*Worker`
//! slice in `hub/hub.go` to an id-keyed map so `Unregister` doesn't need a
//! linear identity scan) and `examples/Tonksthebear-trybotster/cli/src/hub/state.rs`'s
//! `Arc<Mutex<...>>`-wrapped shared-state shape.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::envelope::{MessageBus, Model, WorkerInfo};

pub type WorkerId = Uuid;

/// Everything the Hub knows about one connected worker.
///
/// Owned exclusively by the registry; mutated only through
/// [`Registry::register`]/[`Registry::unregister`] and the task-counter
/// helpers. Destroyed when the transport closes, a liveness probe fails, or
/// a send to it reports the connection gone (spec §3's worker-record
/// lifecycle).
pub struct WorkerRecord {
    pub id: WorkerId,
    pub info: WorkerInfo,
    pub bus: Arc<MessageBus>,
    active_tasks: Mutex<u32>,
}

impl WorkerRecord {
    pub fn new(id: WorkerId, info: WorkerInfo, bus: Arc<MessageBus>) -> Self {
        Self {
            id,
            info,
            bus,
            active_tasks: Mutex::new(0),
        }
    }

    pub async fn active_tasks(&self) -> u32 {
        *self.active_tasks.lock().await
    }

    pub async fn increment_tasks(&self) {
        *self.active_tasks.lock().await += 1;
    }

    pub async fn decrement_tasks(&self) {
        let mut count = self.active_tasks.lock().await;
        *count = count.saturating_sub(1);
    }
}

/// The worker pool. All reads take a snapshot (a cloned `Vec<Arc<WorkerRecord>>`)
/// under the lock and then operate outside it — no transport I/O is ever
/// performed while the registry mutex is held (spec §5, §9's "Registry
/// snapshotting" note).
#[derive(Default)]
pub struct Registry {
    workers: Mutex<HashMap<WorkerId, Arc<WorkerRecord>>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, record: Arc<WorkerRecord>) {
        self.workers.lock().await.insert(record.id, record);
    }

    /// Removes the worker if present and closes its bus. Idempotent: calling
    /// this twice for the same id (or an id never registered) is harmless,
    /// per spec §8's "unregistering an already-unregistered worker is a
    /// no-op" property.
    pub async fn unregister(&self, id: WorkerId) {
        let removed = self.workers.lock().await.remove(&id);
        if let Some(record) = removed {
            record.bus.close().await;
        }
    }

    /// A point-in-time snapshot of the pool, safe to iterate without holding
    /// the registry lock.
    pub async fn snapshot(&self) -> Vec<Arc<WorkerRecord>> {
        self.workers.lock().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    /// The deduplicated union of every registered worker's advertised
    /// models, keyed by `(owned_by, id)` (spec §3's model-index invariant).
    pub async fn model_index(&self) -> Vec<Model> {
        let mut seen = std::collections::HashSet::new();
        let mut models = Vec::new();
        for worker in self.snapshot().await {
            for model in &worker.info.available_models {
                let key = (model.owned_by.clone(), model.id.clone());
                if seen.insert(key) {
                    models.push(model.clone());
                }
            }
        }
        models
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::transport::TransportWriter;
    use crate::error::BusError;
    use async_trait::async_trait;

    struct NullWriter;

    #[async_trait]
    impl TransportWriter for NullWriter {
        async fn send_text(&mut self, _text: String) -> Result<(), BusError> {
            Ok(())
        }
        async fn close(&mut self) {}
    }

    fn worker_with_models(id: WorkerId, models: Vec<Model>) -> Arc<WorkerRecord> {
        let bus = MessageBus::new(Box::new(NullWriter));
        Arc::new(WorkerRecord::new(
            id,
            WorkerInfo {
                worker_name: "test-worker".to_string(),
                available_models: models,
            },
            bus,
        ))
    }

    fn model(id: &str, owner: &str) -> Model {
        Model {
            id: id.to_string(),
            object: "model".to_string(),
            created: 0,
            owned_by: owner.to_string(),
        }
    }

    #[tokio::test]
    async fn unregistering_unknown_worker_is_a_no_op() {
        let registry = Registry::new();
        registry.unregister(Uuid::new_v4()).await;
        assert_eq!(registry.len().await, 0);
    }

    #[tokio::test]
    async fn model_index_deduplicates_by_owner_and_id() {
        let registry = Registry::new();
        registry
            .register(worker_with_models(
                Uuid::new_v4(),
                vec![model("gpt-2", "openai")],
            ))
            .await;
        registry
            .register(worker_with_models(
                Uuid::new_v4(),
                vec![model("gpt-2", "openai"), model("gpt-3", "openai")],
            ))
            .await;

        let index = registry.model_index().await;
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn register_then_unregister_empties_the_pool() {
        let registry = Registry::new();
        let id = Uuid::new_v4();
        registry.register(worker_with_models(id, vec![])).await;
        assert_eq!(registry.len().await, 1);
        registry.unregister(id).await;
        assert_eq!(registry.len().await, 0);
    }
}
