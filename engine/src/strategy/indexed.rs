//! Indexed layout: each transaction is its own document and the round
//! document carries only a ref list plus aggregates.
//!
//! An append is two writes (detail insert, then summary conditional
//! replace) and they are not atomic across keys. A fault between them
//! leaves an orphan detail document; rather than letting the summary drift,
//! a retry of the same logical transaction reconciles against the summary's
//! ref list: detail exists but ref absent means the orphan is adopted and
//! the summary update completes, ref present means a genuine duplicate.

use serde::{Deserialize, Serialize};
use wagerline_types::{Round, Transaction, TransactionRef};

use super::{
    decode, encode, new_round, round_key, transaction_key, ApplyOutcome, Attempt, Committed,
    OpState, Strategy,
};
use crate::engine::ApplyRequest;
use crate::store::{InsertOutcome, ReplaceOutcome, VersionedStore};
use crate::EngineError;

/// Detail document stored under `txn:{round_id}:{transaction_id}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TransactionDocument {
    round_id: String,
    player_id: String,
    agent_id: String,
    #[serde(flatten)]
    transaction: Transaction,
}

pub struct IndexedStrategy<S: VersionedStore> {
    store: S,
}

impl<S: VersionedStore> IndexedStrategy<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn fetch(&self, round_id: &str) -> Result<Option<Round>, EngineError> {
        match self.store.get(&round_key(round_id)).await? {
            Some((bytes, _)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn fetch_detail(
        &self,
        round_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, EngineError> {
        match self
            .store
            .get(&transaction_key(round_id, transaction_id))
            .await?
        {
            Some((bytes, _)) => {
                let doc: TransactionDocument = decode(&bytes)?;
                Ok(Some(doc.transaction))
            }
            None => Ok(None),
        }
    }
}

impl<S: VersionedStore> Strategy for IndexedStrategy<S> {
    fn name(&self) -> &'static str {
        "indexed"
    }

    async fn apply_once(
        &self,
        request: &ApplyRequest,
        transaction: &Transaction,
        op: &mut OpState,
        now_ms: u64,
    ) -> Result<Attempt, EngineError> {
        let rkey = round_key(&request.round_id);
        let summary = self.store.get(&rkey).await?;

        // Duplicate detection runs against the ref list of the summary read
        // in this same attempt.
        let decoded: Option<(Round, _)> = match summary {
            Some((bytes, token)) => {
                let round: Round = decode(&bytes)?;
                if round.contains_transaction(&transaction.transaction_id) {
                    return Err(EngineError::DuplicateTransaction {
                        round_id: request.round_id.clone(),
                        transaction_id: transaction.transaction_id.clone(),
                    });
                }
                Some((round, token))
            }
            None => None,
        };

        let mut detail = transaction.clone();
        detail.timestamp_ms = now_ms;
        // Sequence reflects the count observed when the detail is written;
        // under contention the summary's ref order is authoritative.
        detail.sequence_number = decoded
            .as_ref()
            .map(|(round, _)| round.transaction_count() as u32 + 1)
            .unwrap_or(1);

        if !op.detail_written {
            let tkey = transaction_key(&request.round_id, &transaction.transaction_id);
            let document = TransactionDocument {
                round_id: request.round_id.clone(),
                player_id: request.player_id.clone(),
                agent_id: request.agent_id.clone(),
                transaction: detail.clone(),
            };
            match self.store.insert(&tkey, encode(&document)?).await? {
                InsertOutcome::Created(_) => op.detail_written = true,
                InsertOutcome::AlreadyExists => {
                    // Not in the ref list (checked above), so this is an
                    // orphan from a faulted earlier apply. Adopt it: its
                    // stored values drive the summary update so the ref
                    // always mirrors the detail document.
                    op.adopted = self
                        .fetch_detail(&request.round_id, &transaction.transaction_id)
                        .await?
                        .map(|orphan| TransactionRef::of(&orphan));
                    op.detail_written = true;
                }
            }
        }

        let reference = op
            .adopted
            .clone()
            .unwrap_or_else(|| TransactionRef::of(&detail));

        match decoded {
            None => {
                let mut round = new_round(request, now_ms);
                round.append_transaction_ref(reference, now_ms);
                match self.store.insert(&rkey, encode(&round)?).await? {
                    InsertOutcome::Created(version) => Ok(Attempt::Committed(Committed {
                        outcome: ApplyOutcome::Created,
                        transaction_count: 1,
                        version,
                    })),
                    InsertOutcome::AlreadyExists => Ok(Attempt::Conflict),
                }
            }
            Some((mut round, token)) => {
                round.append_transaction_ref(reference, now_ms);
                match self
                    .store
                    .conditional_replace(&rkey, encode(&round)?, token)
                    .await?
                {
                    ReplaceOutcome::Replaced(version) => Ok(Attempt::Committed(Committed {
                        outcome: ApplyOutcome::Appended,
                        transaction_count: round.transaction_count(),
                        version,
                    })),
                    ReplaceOutcome::VersionConflict => Ok(Attempt::Conflict),
                    ReplaceOutcome::NotFound => Ok(Attempt::Conflict),
                }
            }
        }
    }

    async fn load_round(&self, round_id: &str) -> Result<Option<Round>, EngineError> {
        self.fetch(round_id).await
    }

    async fn load_transaction(
        &self,
        round_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, EngineError> {
        self.fetch_detail(round_id, transaction_id).await
    }

    /// One store call per ref: the cost of keeping round documents small.
    async fn load_transactions(&self, round_id: &str) -> Result<Vec<Transaction>, EngineError> {
        let Some(round) = self.fetch(round_id).await? else {
            return Ok(Vec::new());
        };
        let mut transactions = Vec::with_capacity(round.transaction_refs.len());
        for reference in &round.transaction_refs {
            if let Some(transaction) = self
                .fetch_detail(round_id, &reference.transaction_id)
                .await?
            {
                transactions.push(transaction);
            }
        }
        Ok(transactions)
    }

    async fn remove_round(&self, round_id: &str) -> Result<bool, EngineError> {
        let Some(round) = self.fetch(round_id).await? else {
            return Ok(false);
        };
        for reference in &round.transaction_refs {
            self.store
                .remove(&transaction_key(round_id, &reference.transaction_id))
                .await?;
        }
        Ok(self.store.remove(&round_key(round_id)).await?)
    }
}
