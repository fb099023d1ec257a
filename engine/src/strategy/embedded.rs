//! Embedded layout: the whole transaction sequence lives inside the round
//! document, so one read returns a complete round and every append replaces
//! the document under its version token.

use wagerline_types::{Round, Transaction};

use super::{
    decode, encode, new_round, round_key, ApplyOutcome, Attempt, Committed, OpState, Strategy,
};
use crate::engine::ApplyRequest;
use crate::store::{InsertOutcome, ReplaceOutcome, VersionedStore};
use crate::EngineError;

pub struct EmbeddedStrategy<S: VersionedStore> {
    store: S,
    max_transactions: usize,
}

pub const DEFAULT_MAX_TRANSACTIONS: usize = 100;

impl<S: VersionedStore> EmbeddedStrategy<S> {
    pub fn new(store: S, max_transactions: usize) -> Self {
        Self {
            store,
            max_transactions,
        }
    }

    async fn fetch(&self, round_id: &str) -> Result<Option<Round>, EngineError> {
        match self.store.get(&round_key(round_id)).await? {
            Some((bytes, _)) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: VersionedStore> Strategy for EmbeddedStrategy<S> {
    fn name(&self) -> &'static str {
        "embedded"
    }

    async fn apply_once(
        &self,
        request: &ApplyRequest,
        transaction: &Transaction,
        _op: &mut OpState,
        now_ms: u64,
    ) -> Result<Attempt, EngineError> {
        let key = round_key(&request.round_id);
        match self.store.get(&key).await? {
            None => {
                let mut round = new_round(request, now_ms);
                round.append_transaction(transaction.clone(), now_ms);
                match self.store.insert(&key, encode(&round)?).await? {
                    InsertOutcome::Created(version) => Ok(Attempt::Committed(Committed {
                        outcome: ApplyOutcome::Created,
                        transaction_count: 1,
                        version,
                    })),
                    // Lost the create race; the next attempt reads the
                    // winner's document and appends to it.
                    InsertOutcome::AlreadyExists => Ok(Attempt::Conflict),
                }
            }
            Some((bytes, token)) => {
                let mut round: Round = decode(&bytes)?;
                if round.contains_transaction(&transaction.transaction_id) {
                    return Err(EngineError::DuplicateTransaction {
                        round_id: request.round_id.clone(),
                        transaction_id: transaction.transaction_id.clone(),
                    });
                }
                if round.transactions.len() >= self.max_transactions {
                    return Err(EngineError::RoundFull {
                        round_id: request.round_id.clone(),
                        max: self.max_transactions,
                    });
                }
                round.append_transaction(transaction.clone(), now_ms);
                match self
                    .store
                    .conditional_replace(&key, encode(&round)?, token)
                    .await?
                {
                    ReplaceOutcome::Replaced(version) => Ok(Attempt::Committed(Committed {
                        outcome: ApplyOutcome::Appended,
                        transaction_count: round.transactions.len(),
                        version,
                    })),
                    ReplaceOutcome::VersionConflict => Ok(Attempt::Conflict),
                    // Removed underneath us; re-read and recreate.
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
        Ok(self.fetch(round_id).await?.and_then(|round| {
            round
                .transactions
                .into_iter()
                .find(|t| t.transaction_id == transaction_id)
        }))
    }

    async fn load_transactions(&self, round_id: &str) -> Result<Vec<Transaction>, EngineError> {
        Ok(self
            .fetch(round_id)
            .await?
            .map(|round| round.transactions)
            .unwrap_or_default())
    }

    async fn remove_round(&self, round_id: &str) -> Result<bool, EngineError> {
        Ok(self.store.remove(&round_key(round_id)).await?)
    }
}
