//! Wagerline transaction engine.
//!
//! This crate owns the optimistic-concurrency protocol that applies gaming
//! transactions to per-round documents in a keyed store: read a round and its
//! version token, merge the transaction via the active storage layout, and
//! conditionally replace, retrying with jittered backoff when another writer
//! raced us, bounded by a retry count and a wall-clock budget. A circuit
//! breaker sheds load during sustained store failure and a read-through cache
//! serves display reads.
//!
//! ## Guarantees
//! - No lost updates: a caller that observed success committed, and every
//!   competitor observed a conflict and re-read.
//! - Conflict retries never mask infrastructure faults: store errors surface
//!   immediately and only feed the breaker.
//! - Cached rounds never authorize writes; tokens are re-read from the store
//!   in the same iteration as the conditional replace they guard.
//!
//! The primary entrypoint is [`Engine`], constructed over a
//! [`strategy::Strategy`] (embedded or indexed layout) and a
//! [`store::VersionedStore`].

use std::time::Duration;
use thiserror::Error;

mod backoff;
pub mod breaker;
pub mod cache;
pub mod engine;
pub mod metrics;
pub mod store;
pub mod strategy;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;

#[cfg(test)]
mod engine_tests;

pub use breaker::{BreakerConfig, BreakerState, CircuitBreaker};
pub use cache::{CacheStats, RoundCache};
pub use engine::{ApplyReceipt, ApplyRequest, Engine, EngineConfig};
pub use metrics::{MetricsSink, NoopMetrics, RecordingMetrics};
pub use store::{MemoryStore, StoreError, VersionToken, VersionedStore};
pub use strategy::{ApplyOutcome, EmbeddedStrategy, IndexedStrategy, Strategy};

/// Error type for engine operations.
///
/// Version conflicts never appear here; they drive the retry loop and only
/// surface, already classified, as [`EngineError::ConflictExhausted`] or
/// [`EngineError::Timeout`].
#[derive(Error, Debug)]
pub enum EngineError {
    /// Bad input, rejected before any store interaction.
    #[error("invalid transaction: {0}")]
    Validation(&'static str),
    /// The transaction id was already applied to this round.
    #[error("transaction {transaction_id} already applied to round {round_id}")]
    DuplicateTransaction {
        round_id: String,
        transaction_id: String,
    },
    /// Embedded rounds stop accepting appends at a configured length.
    #[error("round {round_id} is full ({max} transactions)")]
    RoundFull { round_id: String, max: usize },
    /// Every retry saw another writer win the conditional replace.
    #[error("version conflicts exhausted after {retries} retries")]
    ConflictExhausted { retries: u32 },
    /// The wall-clock budget elapsed before a commit.
    #[error("could not commit within {budget:?}")]
    Timeout { budget: Duration },
    /// Infrastructure failure from the store; never retried by the engine.
    #[error(transparent)]
    Store(#[from] store::StoreError),
    /// Admission rejected by an open circuit breaker. Distinct from a store
    /// error so shedding is distinguishable from breakage.
    #[error("admission rejected: circuit open")]
    CircuitOpen,
    /// A stored document could not be decoded (or a model could not be
    /// encoded): the document and the data model disagree.
    #[error("document corrupt: {0}")]
    Corrupt(String),
}
