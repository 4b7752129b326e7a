//! Durable per-master key/value state, keyed by a stable object identity.
//!
//! Thin wrapper over [`coordinator_db::DbConnector`]'s object-id and state
//! operations; the only thing this layer adds is the `getState`-with-default
//! convenience and a place to hang doc comments describing the contract
//! independent of any particular storage backend.

use coordinator_core::{Error, ObjectId};
use coordinator_db::DbConnector;
use std::sync::Arc;

/// Resolves `(class_tag, qualified_name)` pairs to stable integer ids and
/// stores scalar state against them.
pub struct StateStore {
    db: Arc<dyn DbConnector>,
}

impl StateStore {
    /// Wrap a connected [`DbConnector`].
    pub fn new(db: Arc<dyn DbConnector>) -> Self {
        StateStore { db }
    }

    /// Resolve `(class_tag, qualified_name)` to a stable integer id. The
    /// first call for a given pair inserts a row; every subsequent call,
    /// including after a restart, returns the same id.
    pub async fn get_object_id(&self, class_tag: &str, qualified_name: &str) -> Result<ObjectId, Error> {
        self.db.get_object_id(class_tag, qualified_name).await
    }

    /// Fetch stored state for `(objectid, name)`, or `default` if nothing has
    /// been stored yet.
    pub async fn get_state(
        &self,
        objectid: ObjectId,
        name: &str,
        default: serde_json::Value,
    ) -> Result<serde_json::Value, Error> {
        Ok(self.db.get_state(objectid, name).await?.unwrap_or(default))
    }

    /// Fetch stored state for `(objectid, name)`, or `None` if nothing has
    /// been stored yet. Used where the caller needs to distinguish "never
    /// set" from any particular default value (the poller's mark, notably).
    pub async fn get_state_opt(
        &self,
        objectid: ObjectId,
        name: &str,
    ) -> Result<Option<serde_json::Value>, Error> {
        self.db.get_state(objectid, name).await
    }

    /// Durably store `value` for `(objectid, name)`. Last writer wins; the
    /// write is durable before this future resolves.
    pub async fn set_state(&self, objectid: ObjectId, name: &str, value: serde_json::Value) -> Result<(), Error> {
        self.db.set_state(objectid, name, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coordinator_db::memory::MemoryConnector;

    #[tokio::test]
    async fn object_id_resolution_is_idempotent() {
        let store = StateStore::new(Arc::new(MemoryConnector::new()));
        let a = store.get_object_id("master", "m1").await.unwrap();
        let b = store.get_object_id("master", "m1").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn get_state_returns_default_when_absent() {
        let store = StateStore::new(Arc::new(MemoryConnector::new()));
        let id = store.get_object_id("master", "m1").await.unwrap();
        let v = store.get_state(id, "missing", serde_json::json!(null)).await.unwrap();
        assert_eq!(v, serde_json::json!(null));
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let store = StateStore::new(Arc::new(MemoryConnector::new()));
        let id = store.get_object_id("master", "m1").await.unwrap();
        store.set_state(id, "k", serde_json::json!(7)).await.unwrap();
        let v = store.get_state(id, "k", serde_json::json!(0)).await.unwrap();
        assert_eq!(v, serde_json::json!(7));
    }
}
