//! In-process document store backed by a sharded concurrent map.
//!
//! Suitable for tests and single-instance development deployments; nothing
//! survives a restart.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;

use sekitar_shared::errors::StoreError;

use super::{Collection, DocumentStore, TxAction, TxFn};

pub struct MemoryStore {
    docs: DashMap<(Collection, String), Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            docs: DashMap::new(),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .docs
            .get(&(collection, key.to_string()))
            .map(|doc| doc.value().clone()))
    }

    async fn set(&self, collection: Collection, key: &str, doc: Value) -> Result<(), StoreError> {
        self.docs.insert((collection, key.to_string()), doc);
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError> {
        self.docs.remove(&(collection, key.to_string()));
        Ok(())
    }

    async fn transaction(
        &self,
        collection: Collection,
        key: &str,
        f: &mut TxFn<'_>,
    ) -> Result<(), StoreError> {
        // The shard lock is held only for the synchronous closure.
        match self.docs.entry((collection, key.to_string())) {
            Entry::Occupied(mut entry) => {
                if let TxAction::Write(next) = f(Some(entry.get().clone())) {
                    entry.insert(next);
                }
            }
            Entry::Vacant(entry) => {
                if let TxAction::Write(next) = f(None) {
                    entry.insert(next);
                }
            }
        }
        Ok(())
    }

    async fn scan_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        Ok(self
            .docs
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .map(|entry| entry.value().clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn collections_are_isolated() {
        let store = MemoryStore::new();
        store.set(Collection::Users, "1", json!({"n": 1})).await.unwrap();
        store.set(Collection::Likes, "1", json!({"n": 2})).await.unwrap();

        let users = store.scan_all(Collection::Users).await.unwrap();
        assert_eq!(users, vec![json!({"n": 1})]);
        assert!(store.get(Collection::Matches, "1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_are_not_lost() {
        let store = Arc::new(MemoryStore::new());

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .transaction(Collection::Swipes, "u:2026-01-01", &mut |current| {
                        let count = current
                            .and_then(|v| v.get("count").and_then(Value::as_u64))
                            .unwrap_or(0);
                        TxAction::Write(json!({ "count": count + 1 }))
                    })
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let doc = store.get(Collection::Swipes, "u:2026-01-01").await.unwrap().unwrap();
        assert_eq!(doc["count"], 50);
    }

    #[tokio::test]
    async fn get_many_preserves_order() {
        let store = MemoryStore::new();
        store.set(Collection::Likes, "b", json!("like")).await.unwrap();

        let docs = store
            .get_many(Collection::Likes, &["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(docs, vec![None, Some(json!("like"))]);
    }
}
