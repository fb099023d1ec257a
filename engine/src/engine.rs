//! The transaction-application engine: validation, admission, and the
//! optimistic read-mutate-conditional-write loop with retry, backoff, and a
//! wall-clock budget.

use rand::thread_rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};
use wagerline_types::{Round, RoundStatistics, Transaction, TransactionKind};

use crate::backoff::conflict_backoff;
use crate::breaker::{BreakerConfig, BreakerState, CircuitBreaker};
use crate::cache::{CacheStats, RoundCache};
use crate::metrics::{self, MetricsSink};
use crate::store::VersionToken;
use crate::strategy::{ApplyOutcome, Attempt, OpState, Strategy};
use crate::EngineError;

/// One transaction to apply to a round. The round is created implicitly if
/// this is the first transaction directed at its id.
#[derive(Clone, Debug)]
pub struct ApplyRequest {
    pub round_id: String,
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub player_id: String,
    pub agent_id: String,
    pub note: String,
}

/// Successful apply result.
#[derive(Clone, Copy, Debug)]
pub struct ApplyReceipt {
    pub outcome: ApplyOutcome,
    pub transaction_count: usize,
    pub version: VersionToken,
    /// Conflict retries it took to commit (0 = first attempt).
    pub retries: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Conflict retries before giving up with `ConflictExhausted`.
    pub max_retries: u32,
    /// Wall-clock budget for one apply, measured from the first attempt.
    pub timeout_budget: Duration,
    /// Base backoff unit; the n-th retry waits a jittered multiple of it.
    pub base_backoff: Duration,
    /// TTL for display reads served from the round cache.
    pub cache_ttl: Duration,
    pub breaker: BreakerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout_budget: Duration::from_millis(50),
            base_backoff: Duration::from_millis(2),
            cache_ttl: Duration::from_secs(5 * 60),
            breaker: BreakerConfig::default(),
        }
    }
}

/// Applies transactions to rounds through a storage strategy, with a
/// read-through cache for display reads and a circuit breaker gating
/// admission. Constructed once and shared behind an `Arc` by every caller.
pub struct Engine<P: Strategy> {
    strategy: P,
    cache: RoundCache,
    breaker: CircuitBreaker,
    metrics: Arc<dyn MetricsSink>,
    config: EngineConfig,
}

impl<P: Strategy> Engine<P> {
    pub fn new(strategy: P, config: EngineConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            cache: RoundCache::new(config.cache_ttl),
            breaker: CircuitBreaker::new(config.breaker),
            strategy,
            metrics,
            config,
        }
    }

    /// Apply one transaction, creating the round if absent.
    ///
    /// Version conflicts are retried with jittered backoff until either the
    /// retry count or the wall-clock budget runs out; those two exits are
    /// reported distinctly. Store faults are never retried here; only the
    /// breaker's admission policy governs whether later calls go through.
    pub async fn apply_transaction(
        &self,
        request: ApplyRequest,
    ) -> Result<ApplyReceipt, EngineError> {
        if request.round_id.is_empty() {
            return Err(EngineError::Validation("round id must not be empty"));
        }
        if request.transaction_id.is_empty() {
            return Err(EngineError::Validation("transaction id must not be empty"));
        }
        if request.amount <= Decimal::ZERO {
            return Err(EngineError::Validation(
                "transaction amount must be positive",
            ));
        }
        if !self.breaker.allow() {
            self.metrics
                .increment_counter(metrics::name::CIRCUIT_REJECTED);
            return Err(EngineError::CircuitOpen);
        }

        let transaction = Transaction::new(
            request.transaction_id.clone(),
            request.kind,
            request.amount,
        )
        .with_note(request.note.clone());

        let started = Instant::now();
        let mut op = OpState::default();
        let mut retries = 0u32;
        loop {
            let attempt = self
                .strategy
                .apply_once(&request, &transaction, &mut op, now_ms())
                .await;
            match attempt {
                Ok(Attempt::Committed(committed)) => {
                    self.cache.invalidate(&request.round_id);
                    self.breaker.record_success();
                    let timer = match committed.outcome {
                        ApplyOutcome::Created => metrics::name::APPLY_CREATE,
                        ApplyOutcome::Appended => metrics::name::APPLY_APPEND,
                    };
                    self.metrics.record_timer(timer, started.elapsed());
                    return Ok(ApplyReceipt {
                        outcome: committed.outcome,
                        transaction_count: committed.transaction_count,
                        version: committed.version,
                        retries,
                    });
                }
                Ok(Attempt::Conflict) => {
                    retries += 1;
                    self.metrics
                        .increment_counter(metrics::name::CONFLICT_RETRY);
                    if started.elapsed() >= self.config.timeout_budget {
                        self.breaker.record_failure();
                        self.metrics.increment_counter(metrics::name::TIMEOUT);
                        return Err(EngineError::Timeout {
                            budget: self.config.timeout_budget,
                        });
                    }
                    if retries > self.config.max_retries {
                        self.breaker.record_failure();
                        self.metrics
                            .increment_counter(metrics::name::CONFLICT_EXHAUSTED);
                        return Err(EngineError::ConflictExhausted {
                            retries: self.config.max_retries,
                        });
                    }
                    debug!(
                        round_id = %request.round_id,
                        retries,
                        "version conflict, backing off"
                    );
                    let delay = {
                        let mut rng = thread_rng();
                        conflict_backoff(&mut rng, self.config.base_backoff, retries)
                    };
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    if matches!(err, EngineError::Store(_) | EngineError::Corrupt(_)) {
                        warn!(round_id = %request.round_id, %err, "apply failed");
                        self.breaker.record_failure();
                        self.metrics.increment_counter(metrics::name::STORE_ERROR);
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Display read: served from the cache when fresh, read through to the
    /// store otherwise. Never exposes a version token.
    pub async fn round(&self, round_id: &str) -> Result<Option<Round>, EngineError> {
        if let Some(round) = self.cache.get(round_id) {
            return Ok(Some(round));
        }
        let round = self.strategy.load_round(round_id).await?;
        if let Some(round) = &round {
            self.cache.put(round.clone());
        }
        Ok(round)
    }

    /// Fetch one transaction of a round.
    pub async fn transaction(
        &self,
        round_id: &str,
        transaction_id: &str,
    ) -> Result<Option<Transaction>, EngineError> {
        self.strategy.load_transaction(round_id, transaction_id).await
    }

    /// Fetch a round's full transaction history, in append order.
    pub async fn transactions(&self, round_id: &str) -> Result<Vec<Transaction>, EngineError> {
        self.strategy.load_transactions(round_id).await
    }

    /// Aggregate view of a round, for administrative reads.
    pub async fn round_statistics(
        &self,
        round_id: &str,
    ) -> Result<Option<RoundStatistics>, EngineError> {
        Ok(self.round(round_id).await?.map(|round| round.statistics()))
    }

    /// Administrative removal of a round and everything attached to it.
    /// Outside the engine's concurrency guarantees.
    pub async fn remove_round(&self, round_id: &str) -> Result<bool, EngineError> {
        self.cache.invalidate(round_id);
        self.strategy.remove_round(round_id).await
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    pub fn breaker_state(&self) -> BreakerState {
        self.breaker.state()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
