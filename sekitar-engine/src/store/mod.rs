//! Key-addressed document store the engine persists everything in.
//!
//! Every read-modify-write goes through [`DocumentStore::transaction`]; the
//! typed helpers below build profile mutations on top of it.

mod memory;
mod redis;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use sekitar_shared::errors::{AppError, AppResult, StoreError};

use crate::models::Profile;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Likes,
    Matches,
    Swipes,
}

impl Collection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Likes => "likes",
            Self::Matches => "matches",
            Self::Swipes => "swipes",
        }
    }
}

/// What a transaction closure wants done with the record it inspected.
#[derive(Debug)]
pub enum TxAction {
    Write(Value),
    Keep,
}

/// The closure may run more than once when a backend retries on conflict.
pub type TxFn<'a> = dyn FnMut(Option<Value>) -> TxAction + Send + 'a;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>, StoreError>;

    /// Batch lookup; results line up with `keys`.
    async fn get_many(
        &self,
        collection: Collection,
        keys: &[String],
    ) -> Result<Vec<Option<Value>>, StoreError> {
        let mut docs = Vec::with_capacity(keys.len());
        for key in keys {
            docs.push(self.get(collection, key).await?);
        }
        Ok(docs)
    }

    async fn set(&self, collection: Collection, key: &str, doc: Value) -> Result<(), StoreError>;

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StoreError>;

    /// Atomic read-modify-write of one record.
    async fn transaction(
        &self,
        collection: Collection,
        key: &str,
        f: &mut TxFn<'_>,
    ) -> Result<(), StoreError>;

    async fn scan_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    /// Merge top-level fields into an existing record.
    async fn update(
        &self,
        collection: Collection,
        key: &str,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut found = false;
        self.transaction(collection, key, &mut |current| match current {
            Some(Value::Object(mut doc)) => {
                found = true;
                for (field, value) in fields.iter() {
                    doc.insert(field.clone(), value.clone());
                }
                TxAction::Write(Value::Object(doc))
            }
            _ => {
                found = false;
                TxAction::Keep
            }
        })
        .await?;

        if found {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    /// Write `doc` only when `key` holds nothing; true when this call created it.
    async fn create_if_absent(
        &self,
        collection: Collection,
        key: &str,
        doc: Value,
    ) -> Result<bool, StoreError> {
        let mut created = false;
        self.transaction(collection, key, &mut |current| {
            created = current.is_none();
            if created {
                TxAction::Write(doc.clone())
            } else {
                TxAction::Keep
            }
        })
        .await?;
        Ok(created)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

// --- Typed access ---

pub async fn get_doc<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.get(collection, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

pub async fn put_doc<T: Serialize + Sync>(
    store: &dyn DocumentStore,
    collection: Collection,
    key: &str,
    doc: &T,
) -> Result<(), StoreError> {
    store.set(collection, key, serde_json::to_value(doc)?).await
}

/// Every document in `collection` that parses as `T`; malformed ones are logged and skipped.
pub async fn scan_docs<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    collection: Collection,
) -> Result<Vec<T>, StoreError> {
    let docs = store.scan_all(collection).await?;
    Ok(docs
        .into_iter()
        .filter_map(|doc| match serde_json::from_value(doc) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                tracing::warn!(collection = collection.as_str(), error = %e, "skipping malformed document");
                None
            }
        })
        .collect())
}

pub async fn get_profile(store: &dyn DocumentStore, user_id: &str) -> AppResult<Option<Profile>> {
    Ok(get_doc(store, Collection::Users, user_id).await?)
}

/// Load a profile, mapping absence to the "needs registration" error.
pub async fn require_profile(store: &dyn DocumentStore, user_id: &str) -> AppResult<Profile> {
    get_profile(store, user_id)
        .await?
        .ok_or_else(AppError::profile_not_found)
}

/// Apply `f` to the stored profile atomically.
///
/// Fails with `ProfileNotFound` when the record does not exist; it is never
/// recreated. When `f` errors or leaves the profile unchanged nothing is written.
pub async fn update_profile<T, F>(store: &dyn DocumentStore, user_id: &str, mut f: F) -> AppResult<T>
where
    T: Send,
    F: FnMut(&mut Profile) -> AppResult<T> + Send,
{
    let mut outcome: Option<AppResult<T>> = None;

    store
        .transaction(Collection::Users, user_id, &mut |current| {
            let Some(value) = current else {
                outcome = Some(Err(AppError::profile_not_found()));
                return TxAction::Keep;
            };
            let mut profile: Profile = match serde_json::from_value(value) {
                Ok(p) => p,
                Err(e) => {
                    outcome = Some(Err(StoreError::from(e).into()));
                    return TxAction::Keep;
                }
            };
            let before = profile.clone();

            match f(&mut profile) {
                Ok(result) => {
                    outcome = Some(Ok(result));
                    if profile == before {
                        return TxAction::Keep;
                    }
                    match serde_json::to_value(&profile) {
                        Ok(doc) => TxAction::Write(doc),
                        Err(e) => {
                            outcome = Some(Err(StoreError::from(e).into()));
                            TxAction::Keep
                        }
                    }
                }
                Err(e) => {
                    outcome = Some(Err(e));
                    TxAction::Keep
                }
            }
        })
        .await?;

    outcome.unwrap_or_else(|| Err(AppError::internal("profile transaction produced no outcome")))
}
