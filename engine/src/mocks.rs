//! Fault-injecting store wrappers for tests and benchmarks.

use bytes::Bytes;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::store::{InsertOutcome, ReplaceOutcome, StoreError, VersionToken, VersionedStore};

/// Wrapper that fails the next `n` operations with a transport error, then
/// passes everything through.
#[derive(Clone)]
pub struct FlakyStore<S: VersionedStore> {
    inner: S,
    failures_remaining: Arc<AtomicU32>,
}

impl<S: VersionedStore> FlakyStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            failures_remaining: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures_remaining.store(n, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .failures_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(StoreError::Transport("injected fault".to_string()));
        }
        Ok(())
    }
}

impl<S: VersionedStore> VersionedStore for FlakyStore<S> {
    async fn get(&self, key: &str) -> Result<Option<(Bytes, VersionToken)>, StoreError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn insert(&self, key: &str, value: Bytes) -> Result<InsertOutcome, StoreError> {
        self.check()?;
        self.inner.insert(key, value).await
    }

    async fn conditional_replace(
        &self,
        key: &str,
        value: Bytes,
        token: VersionToken,
    ) -> Result<ReplaceOutcome, StoreError> {
        self.check()?;
        self.inner.conditional_replace(key, value, token).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        self.inner.remove(key).await
    }
}

/// Wrapper that answers the next `n` conditional replaces with a version
/// conflict regardless of token, to exercise retry paths deterministically.
#[derive(Clone)]
pub struct ContendedStore<S: VersionedStore> {
    inner: S,
    conflicts_remaining: Arc<AtomicU32>,
}

impl<S: VersionedStore> ContendedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            conflicts_remaining: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn conflict_next(&self, n: u32) {
        self.conflicts_remaining.store(n, Ordering::SeqCst);
    }
}

impl<S: VersionedStore> VersionedStore for ContendedStore<S> {
    async fn get(&self, key: &str) -> Result<Option<(Bytes, VersionToken)>, StoreError> {
        self.inner.get(key).await
    }

    async fn insert(&self, key: &str, value: Bytes) -> Result<InsertOutcome, StoreError> {
        self.inner.insert(key, value).await
    }

    async fn conditional_replace(
        &self,
        key: &str,
        value: Bytes,
        token: VersionToken,
    ) -> Result<ReplaceOutcome, StoreError> {
        let remaining = self.conflicts_remaining.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .conflicts_remaining
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Ok(ReplaceOutcome::VersionConflict);
        }
        self.inner.conditional_replace(key, value, token).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StoreError> {
        self.inner.remove(key).await
    }
}
