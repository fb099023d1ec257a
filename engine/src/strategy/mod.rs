//! Storage strategies: how a round and its transactions are laid out in the
//! keyed store.
//!
//! Both strategies satisfy the same [`Strategy`] contract and the same test
//! suite; the engine drives whichever it was constructed with. [`embedded`]
//! keeps the whole transaction sequence inside the round document (one read
//! fetches everything, documents grow). [`indexed`] keeps detail documents
//! under their own keys with a lightweight ref list on the round (documents
//! stay small, history reads cost one store call per transaction).

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use wagerline_types::{default_initial_balance, Round, Transaction, TransactionRef};

use crate::engine::ApplyRequest;
use crate::store::VersionToken;
use crate::EngineError;

pub mod embedded;
pub mod indexed;

pub use embedded::EmbeddedStrategy;
pub use indexed::IndexedStrategy;

/// How a committed apply changed the round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The round did not exist; it was created with this transaction as its
    /// first element.
    Created,
    /// The transaction was appended to an existing round.
    Appended,
}

/// Result of one read-mutate-conditional-write attempt.
#[derive(Clone, Copy, Debug)]
pub enum Attempt {
    Committed(Committed),
    /// Another writer raced us; the caller re-reads and tries again.
    Conflict,
}

#[derive(Clone, Copy, Debug)]
pub struct Committed {
    pub outcome: ApplyOutcome,
    pub transaction_count: usize,
    pub version: VersionToken,
}

/// Mutable state threaded through the attempts of one logical apply, so a
/// strategy can remember what it already wrote before a conflict.
#[derive(Default)]
pub struct OpState {
    /// The detail document for this transaction is in the store (written by
    /// an earlier attempt, or adopted as an orphan of a faulted one).
    pub(crate) detail_written: bool,
    /// Ref values taken from an adopted orphan detail document.
    pub(crate) adopted: Option<TransactionRef>,
}

/// One storage layout over the keyed store.
///
/// `apply_once` performs a single optimistic attempt against a token read in
/// that same call; the engine owns retries, backoff, and budgets.
pub trait Strategy: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn apply_once(
        &self,
        request: &ApplyRequest,
        transaction: &Transaction,
        op: &mut OpState,
        now_ms: u64,
    ) -> impl Future<Output = Result<Attempt, EngineError>> + Send;

    /// Fetch the round document (summary form for indexed layouts).
    fn load_round(
        &self,
        round_id: &str,
    ) -> impl Future<Output = Result<Option<Round>, EngineError>> + Send;

    /// Fetch one transaction of a round.
    fn load_transaction(
        &self,
        round_id: &str,
        transaction_id: &str,
    ) -> impl Future<Output = Result<Option<Transaction>, EngineError>> + Send;

    /// Fetch the round's full transaction history, in append order.
    fn load_transactions(
        &self,
        round_id: &str,
    ) -> impl Future<Output = Result<Vec<Transaction>, EngineError>> + Send;

    /// Administrative removal of a round and everything attached to it.
    /// Returns whether the round existed.
    fn remove_round(&self, round_id: &str)
        -> impl Future<Output = Result<bool, EngineError>> + Send;
}

pub(crate) fn round_key(round_id: &str) -> String {
    format!("round:{round_id}")
}

pub(crate) fn transaction_key(round_id: &str, transaction_id: &str) -> String {
    format!("txn:{round_id}:{transaction_id}")
}

/// Round a first transaction lands in when its id has never been seen.
pub(crate) fn new_round(request: &ApplyRequest, now_ms: u64) -> Round {
    Round::new(
        request.round_id.clone(),
        1,
        request.player_id.clone(),
        request.agent_id.clone(),
        default_initial_balance(),
        now_ms,
    )
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Bytes, EngineError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| EngineError::Corrupt(format!("encode: {err}")))
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &Bytes) -> Result<T, EngineError> {
    serde_json::from_slice(bytes).map_err(|err| EngineError::Corrupt(format!("decode: {err}")))
}
