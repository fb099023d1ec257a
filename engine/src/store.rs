//! Keyed document store contract with version-token concurrency control.
//!
//! The engine is written against [`VersionedStore`]; any backend that can do
//! a compare-and-swap on an opaque revision token satisfies it. Expected
//! conditions (missing documents, duplicate keys, version conflicts) are
//! modeled as result variants so retry logic is a plain branch; only
//! transport-level faults surface as [`StoreError`].

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Opaque revision identifier for a stored document.
///
/// Tokens are compared by equality only. A conditional replace succeeds only
/// when the caller's token matches the document's current revision; a stale
/// token always yields a conflict, never a silent overwrite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VersionToken(u64);

/// Transport-level store failure (network, timeout, backend fault).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store transport failure: {0}")]
    Transport(String),
}

/// Outcome of an unconditional insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertOutcome {
    Created(VersionToken),
    AlreadyExists,
}

/// Outcome of a conditional replace.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplaceOutcome {
    Replaced(VersionToken),
    VersionConflict,
    NotFound,
}

/// A keyed document store with per-document revision tokens.
///
/// Implementations must be cheaply cloneable handles onto shared state so
/// many concurrent writers can hold one.
pub trait VersionedStore: Clone + Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<(Bytes, VersionToken)>, StoreError>> + Send;

    fn insert(
        &self,
        key: &str,
        value: Bytes,
    ) -> impl Future<Output = Result<InsertOutcome, StoreError>> + Send;

    fn conditional_replace(
        &self,
        key: &str,
        value: Bytes,
        token: VersionToken,
    ) -> impl Future<Output = Result<ReplaceOutcome, StoreError>> + Send;

    /// Remove a document. Returns whether it existed.
    fn remove(&self, key: &str) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Connectivity probe: write a document under `probe_key`, read it back,
    /// and remove it. Any transport fault along the way surfaces.
    fn ping(&self, probe_key: &str) -> impl Future<Output = Result<(), StoreError>> + Send {
        async move {
            self.insert(probe_key, Bytes::from_static(b"{\"probe\":true}"))
                .await?;
            self.get(probe_key).await?;
            self.remove(probe_key).await?;
            Ok(())
        }
    }
}

/// In-memory [`VersionedStore`] used by tests and the load harness.
///
/// Revision tokens come from a store-wide counter, so a token can never be
/// valid for two distinct revisions even across remove/recreate.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    documents: HashMap<String, (Bytes, u64)>,
    next_revision: u64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents currently stored.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VersionedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<(Bytes, VersionToken)>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .documents
            .get(key)
            .map(|(bytes, revision)| (bytes.clone(), VersionToken(*revision))))
    }

    async fn insert(&self, key: &str, value: Bytes) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.documents.contains_key(key) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        inner.next_revision += 1;
        let revision = inner.next_revision;
        inner.documents.insert(key.to_string(), (value, revision));
        Ok(InsertOutcome::Created(VersionToken(revision)))
    }

    async fn conditional_replace(
        &self,
        key: &str,
        value: Bytes,
        token: VersionToken,
    ) -> Result<ReplaceOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let Some((_, revision)) = inner.documents.get(key) else {
            return Ok(ReplaceOutcome::NotFound);
        };
        if VersionToken(*revision) != token {
            return Ok(ReplaceOutcome::VersionConflict);
        }
        inner.next_revision += 1;
        let revision = inner.next_revision;
        inner.documents.insert(key.to_string(), (value, revision));
        Ok(ReplaceOutcome::Replaced(VersionToken(revision)))
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.documents.remove(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_then_get_round_trips() {
        let store = MemoryStore::new();
        let outcome = store.insert("k", Bytes::from_static(b"v1")).await.unwrap();
        let InsertOutcome::Created(token) = outcome else {
            panic!("expected create, got {outcome:?}");
        };

        let (bytes, read_token) = store.get("k").await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), b"v1");
        assert_eq!(read_token, token);
    }

    #[tokio::test]
    async fn test_double_insert_reports_existing() {
        let store = MemoryStore::new();
        store.insert("k", Bytes::from_static(b"v1")).await.unwrap();
        let outcome = store.insert("k", Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(outcome, InsertOutcome::AlreadyExists);

        // The original document is untouched.
        let (bytes, _) = store.get("k").await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), b"v1");
    }

    #[tokio::test]
    async fn test_stale_token_conflicts_without_corruption() {
        let store = MemoryStore::new();
        let InsertOutcome::Created(stale) =
            store.insert("k", Bytes::from_static(b"v1")).await.unwrap()
        else {
            panic!("insert failed");
        };

        // Another writer advances the revision.
        let replaced = store
            .conditional_replace("k", Bytes::from_static(b"v2"), stale)
            .await
            .unwrap();
        let ReplaceOutcome::Replaced(fresh) = replaced else {
            panic!("expected replace, got {replaced:?}");
        };

        // The stale token now always conflicts.
        let conflicted = store
            .conditional_replace("k", Bytes::from_static(b"v3"), stale)
            .await
            .unwrap();
        assert_eq!(conflicted, ReplaceOutcome::VersionConflict);

        let (bytes, token) = store.get("k").await.unwrap().unwrap();
        assert_eq!(bytes.as_ref(), b"v2");
        assert_eq!(token, fresh);
    }

    #[tokio::test]
    async fn test_replace_of_missing_key_reports_not_found() {
        let store = MemoryStore::new();
        let InsertOutcome::Created(token) =
            store.insert("k", Bytes::from_static(b"v1")).await.unwrap()
        else {
            panic!("insert failed");
        };
        store.remove("k").await.unwrap();

        let outcome = store
            .conditional_replace("k", Bytes::from_static(b"v2"), token)
            .await
            .unwrap();
        assert_eq!(outcome, ReplaceOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_token_never_reused_across_recreate() {
        let store = MemoryStore::new();
        let InsertOutcome::Created(old) =
            store.insert("k", Bytes::from_static(b"v1")).await.unwrap()
        else {
            panic!("insert failed");
        };
        store.remove("k").await.unwrap();
        store.insert("k", Bytes::from_static(b"v2")).await.unwrap();

        let outcome = store
            .conditional_replace("k", Bytes::from_static(b"v3"), old)
            .await
            .unwrap();
        assert_eq!(outcome, ReplaceOutcome::VersionConflict);
    }

    #[tokio::test]
    async fn test_ping_round_trips_and_cleans_up() {
        let store = MemoryStore::new();
        store.ping("probe-1").await.unwrap();
        assert!(store.get("probe-1").await.unwrap().is_none());
    }
}
