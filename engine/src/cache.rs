//! Read-through cache for round documents.
//!
//! Serves display reads only: a cached round never carries a version token,
//! so nothing read from here can authorize a write. Writers invalidate after
//! every successful commit; entries past their TTL count as misses and are
//! evicted lazily on access.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use wagerline_types::Round;

const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

struct CacheEntry {
    round: Round,
    expires_at: Instant,
}

pub struct RoundCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl RoundCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, round_id: &str) -> Option<Round> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(round_id) {
            Some(entry) if entry.expires_at > Instant::now() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.round.clone())
            }
            Some(_) => {
                entries.remove(round_id);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn put(&self, round: Round) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            round.round_id.clone(),
            CacheEntry {
                round,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub fn invalidate(&self, round_id: &str) {
        self.entries.lock().unwrap().remove(round_id);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.lock().unwrap().len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for RoundCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}
