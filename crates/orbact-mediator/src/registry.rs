//! Concurrent store of per-server records.
//!
//! Two-level locking: the registry lock guards structural growth and
//! snapshot iteration only, and is never held across a record mutation;
//! each record carries its own lock. Unrelated servers therefore make
//! progress independently, while conflicting updates to one server
//! serialize on its record. Records are never removed: server identities
//! are stable for the life of the mediator.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use orbact_common::ServerId;

use crate::server::ServerRecord;

/// Shared handle to one server's record.
pub type RecordRef = Arc<Mutex<ServerRecord>>;

#[derive(Default)]
pub struct Registry {
    inner: RwLock<HashMap<ServerId, RecordRef>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record for `id`, created Inactive if absent. Never fails.
    pub async fn get_or_create(&self, id: &str) -> RecordRef {
        if let Some(rec) = self.inner.read().await.get(id) {
            return rec.clone();
        }
        let mut map = self.inner.write().await;
        map.entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ServerRecord::new(id))))
            .clone()
    }

    pub async fn get(&self, id: &str) -> Option<RecordRef> {
        self.inner.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.read().await.contains_key(id)
    }

    /// Snapshot of all records, for iteration without holding the registry
    /// lock.
    pub async fn snapshot(&self) -> Vec<(ServerId, RecordRef)> {
        self.inner
            .read()
            .await
            .iter()
            .map(|(id, rec)| (id.clone(), rec.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ServerState;

    #[tokio::test]
    async fn test_get_or_create_creates_inactive() {
        let registry = Registry::new();
        let rec = registry.get_or_create("srv-a").await;
        let rec = rec.lock().await;
        assert_eq!(rec.id(), "srv-a");
        assert_eq!(rec.state, ServerState::Inactive);
    }

    #[tokio::test]
    async fn test_get_or_create_returns_same_record() {
        let registry = Registry::new();
        let first = registry.get_or_create("srv-a").await;
        let second = registry.get_or_create("srv-a").await;
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let registry = Registry::new();
        assert!(registry.get("nope").await.is_none());
        assert!(!registry.contains("nope").await);
    }

    #[tokio::test]
    async fn test_field_mutation_survives_lookup() {
        let registry = Registry::new();
        {
            let rec = registry.get_or_create("srv-a").await;
            rec.lock().await.state = ServerState::Holding;
        }
        let rec = registry.get("srv-a").await.unwrap();
        assert_eq!(rec.lock().await.state, ServerState::Holding);
    }

    #[tokio::test]
    async fn test_snapshot_lists_all() {
        let registry = Registry::new();
        registry.get_or_create("srv-a").await;
        registry.get_or_create("srv-b").await;
        let mut ids: Vec<_> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["srv-a", "srv-b"]);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_single_record() {
        let registry = Arc::new(Registry::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.get_or_create("srv-a").await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(registry.len().await, 1);
    }
}
