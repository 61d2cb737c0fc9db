//! `StateStore`: optional one-way persistence of bot and order records.
//!
//! Grounded on `db/manager.py`'s `FireStoreManager` — the shape of
//! `create_and_use_runner` / `update_runner` / `create_order` /
//! `update_order` / `delete_order` carries over directly; deliberately no
//! read-back method is exposed, matching SPEC_FULL.md §6.3's "recovery is
//! not part of the core contract".

use async_trait::async_trait;
use serde_json::Value;

use crate::error::AdapterError;
use crate::model::OrderId;

/// A write-through sink the bot may optionally hold behind
/// `Option<Arc<dyn StateStore>>` (SPEC_FULL.md §9's typed dependency
/// bundle). All writes are best-effort: a failure here must not abort a
/// sync, only be logged and, where it concerns an error path, reported
/// through the `Notifier` by the caller.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Create the run-level document this bot's subsequent writes are
    /// scoped under, and return its id.
    async fn create_and_use_runner(&self, runner_id: &str, fields: Value) -> Result<(), AdapterError>;

    async fn update_runner(&self, runner_id: &str, fields: Value) -> Result<(), AdapterError>;

    async fn create_order(&self, order_id: OrderId, fields: Value) -> Result<(), AdapterError>;

    async fn update_order(&self, order_id: OrderId, fields: Value) -> Result<(), AdapterError>;

    async fn delete_order(&self, order_id: OrderId) -> Result<(), AdapterError>;
}


#[cfg(test)]
mod tests {
    use super::mock::MockStateStore;
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn mock_store_tracks_order_writes() {
        let store = MockStateStore::new();
        store.create_order(1, json!({"status": "ToCreate"})).await.unwrap();
        assert_eq!(store.orders.lock().await.len(), 1);

        store.delete_order(1).await.unwrap();
        assert!(store.orders.lock().await.is_empty());
    }
}
