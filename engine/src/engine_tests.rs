//! Engine scenario tests: create/append receipts, validation, admission
//! control, and the two distinct contention exits, over both storage
//! strategies where behavior is shared.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::mocks::{ContendedStore, FlakyStore};
use crate::store::MemoryStore;
use crate::strategy::{ApplyOutcome, EmbeddedStrategy, IndexedStrategy, Strategy};
use crate::{
    ApplyRequest, BreakerConfig, BreakerState, Engine, EngineConfig, EngineError, NoopMetrics,
    RecordingMetrics,
};
use wagerline_types::TransactionKind;

fn request(round_id: &str, transaction_id: &str, kind: TransactionKind, amount: i64) -> ApplyRequest {
    ApplyRequest {
        round_id: round_id.into(),
        transaction_id: transaction_id.into(),
        kind,
        amount: Decimal::from(amount),
        player_id: "P1".into(),
        agent_id: "A1".into(),
        note: String::new(),
    }
}

fn engine<P: Strategy>(strategy: P) -> Engine<P> {
    Engine::new(strategy, EngineConfig::default(), Arc::new(NoopMetrics))
}

async fn assert_create_then_append<P: Strategy>(engine: &Engine<P>) {
    let receipt = engine
        .apply_transaction(request("R1", "T1", TransactionKind::Bet, 50))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, ApplyOutcome::Created);
    assert_eq!(receipt.transaction_count, 1);
    assert_eq!(receipt.retries, 0);

    let receipt = engine
        .apply_transaction(request("R1", "T2", TransactionKind::Win, 75))
        .await
        .unwrap();
    assert_eq!(receipt.outcome, ApplyOutcome::Appended);
    assert_eq!(receipt.transaction_count, 2);

    let round = engine.round("R1").await.unwrap().unwrap();
    assert_eq!(round.transaction_count(), 2);
    assert_eq!(round.balance, Decimal::from(1025));

    // Nested reads resolve through whichever layout is active.
    let txn = engine.transaction("R1", "T2").await.unwrap().unwrap();
    assert_eq!(txn.kind, TransactionKind::Win);
    let history = engine.transactions("R1").await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].transaction_id, "T1");
}

#[tokio::test]
async fn test_create_then_append_embedded() {
    let e = engine(EmbeddedStrategy::new(MemoryStore::new(), 100));
    assert_create_then_append(&e).await;
}

#[tokio::test]
async fn test_create_then_append_indexed() {
    let e = engine(IndexedStrategy::new(MemoryStore::new()));
    assert_create_then_append(&e).await;
}

#[tokio::test]
async fn test_non_positive_amount_fails_before_the_store() {
    // A store that would fail every call proves validation never reaches it.
    let store = FlakyStore::new(MemoryStore::new());
    store.fail_next(u32::MAX);
    let e = engine(EmbeddedStrategy::new(store, 100));

    for amount in [0, -5] {
        let err = e
            .apply_transaction(request("R1", "T1", TransactionKind::Bet, amount))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "got {err}");
    }
    for (round_id, transaction_id) in [("", "T1"), ("R1", "")] {
        let err = e
            .apply_transaction(request(round_id, transaction_id, TransactionKind::Bet, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "got {err}");
    }
    // And the breaker never saw a failure.
    assert_eq!(e.breaker_state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_store_faults_trip_the_breaker_and_open_rejects() {
    let store = FlakyStore::new(MemoryStore::new());
    let e = engine(EmbeddedStrategy::new(store.clone(), 100));

    store.fail_next(5);
    for i in 0..5 {
        let err = e
            .apply_transaction(request("R1", &format!("T{i}"), TransactionKind::Bet, 10))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Store(_)), "got {err}");
    }
    assert_eq!(e.breaker_state(), BreakerState::Open);

    // Admission now fails fast with a distinct tag, without touching the
    // store (no faults are armed; a store call would succeed).
    let err = e
        .apply_transaction(request("R1", "T9", TransactionKind::Bet, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CircuitOpen), "got {err}");
}

#[tokio::test]
async fn test_breaker_recovers_through_half_open() {
    let store = FlakyStore::new(MemoryStore::new());
    let mut config = EngineConfig::default();
    config.breaker = BreakerConfig {
        failure_threshold: 5,
        success_threshold: 3,
        cooldown: Duration::from_millis(20),
    };
    let e = Engine::new(
        EmbeddedStrategy::new(store.clone(), 100),
        config,
        Arc::new(NoopMetrics),
    );

    store.fail_next(5);
    for i in 0..5 {
        let _ = e
            .apply_transaction(request("R1", &format!("T{i}"), TransactionKind::Bet, 10))
            .await;
    }
    assert_eq!(e.breaker_state(), BreakerState::Open);

    tokio::time::sleep(Duration::from_millis(30)).await;
    for i in 0..3 {
        e.apply_transaction(request("R1", &format!("P{i}"), TransactionKind::Bet, 10))
            .await
            .unwrap();
    }
    assert_eq!(e.breaker_state(), BreakerState::Closed);
}

#[tokio::test]
async fn test_conflict_exhausted_when_retries_run_out_first() {
    let store = ContendedStore::new(MemoryStore::new());
    let config = EngineConfig {
        max_retries: 3,
        timeout_budget: Duration::from_secs(10),
        base_backoff: Duration::from_millis(1),
        ..EngineConfig::default()
    };
    let metrics = Arc::new(RecordingMetrics::new());
    let e = Engine::new(
        EmbeddedStrategy::new(store.clone(), 100),
        config,
        metrics.clone(),
    );

    // Round exists, so every attempt goes down the conditional-replace path.
    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 10))
        .await
        .unwrap();

    store.conflict_next(100);
    let err = e
        .apply_transaction(request("R1", "T2", TransactionKind::Bet, 10))
        .await
        .unwrap_err();
    assert!(
        matches!(err, EngineError::ConflictExhausted { retries: 3 }),
        "got {err}"
    );
    assert_eq!(metrics.counter(crate::metrics::name::CONFLICT_EXHAUSTED), 1);
    assert_eq!(metrics.counter(crate::metrics::name::TIMEOUT), 0);
}

#[tokio::test]
async fn test_timeout_when_budget_runs_out_first() {
    let store = ContendedStore::new(MemoryStore::new());
    let config = EngineConfig {
        max_retries: 1_000,
        timeout_budget: Duration::from_millis(15),
        base_backoff: Duration::from_millis(5),
        ..EngineConfig::default()
    };
    let metrics = Arc::new(RecordingMetrics::new());
    let e = Engine::new(
        EmbeddedStrategy::new(store.clone(), 100),
        config,
        metrics.clone(),
    );

    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 10))
        .await
        .unwrap();

    store.conflict_next(10_000);
    let err = e
        .apply_transaction(request("R1", "T2", TransactionKind::Bet, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Timeout { .. }), "got {err}");
    assert_eq!(metrics.counter(crate::metrics::name::TIMEOUT), 1);
    assert_eq!(metrics.counter(crate::metrics::name::CONFLICT_EXHAUSTED), 0);
}

#[tokio::test]
async fn test_commit_after_transient_conflicts_reports_retries() {
    let store = ContendedStore::new(MemoryStore::new());
    let config = EngineConfig {
        max_retries: 5,
        timeout_budget: Duration::from_secs(10),
        base_backoff: Duration::from_millis(1),
        ..EngineConfig::default()
    };
    let e = Engine::new(
        EmbeddedStrategy::new(store.clone(), 100),
        config,
        Arc::new(NoopMetrics),
    );

    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 10))
        .await
        .unwrap();

    store.conflict_next(2);
    let receipt = e
        .apply_transaction(request("R1", "T2", TransactionKind::Bet, 10))
        .await
        .unwrap();
    assert_eq!(receipt.retries, 2);
    assert_eq!(receipt.transaction_count, 2);
}

#[tokio::test]
async fn test_display_reads_are_cached_and_writes_invalidate() {
    let e = engine(EmbeddedStrategy::new(MemoryStore::new(), 100));
    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 10))
        .await
        .unwrap();

    // First read misses and populates; second is served from cache.
    e.round("R1").await.unwrap().unwrap();
    e.round("R1").await.unwrap().unwrap();
    let stats = e.cache_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    // A successful write invalidates, so the next read sees the new state
    // from the store rather than the cached document.
    e.apply_transaction(request("R1", "T2", TransactionKind::Win, 20))
        .await
        .unwrap();
    let round = e.round("R1").await.unwrap().unwrap();
    assert_eq!(round.transaction_count(), 2);
    assert_eq!(e.cache_stats().misses, 2);
}

#[tokio::test]
async fn test_round_statistics_snapshot() {
    let e = engine(IndexedStrategy::new(MemoryStore::new()));
    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 100))
        .await
        .unwrap();
    e.apply_transaction(request("R1", "T2", TransactionKind::Win, 40))
        .await
        .unwrap();

    let stats = e.round_statistics("R1").await.unwrap().unwrap();
    assert_eq!(stats.transaction_count, 2);
    assert_eq!(stats.summary.total_bets, Decimal::from(100));
    assert_eq!(stats.summary.net_amount, Decimal::from(-60));
    assert!(e.round_statistics("R9").await.unwrap().is_none());
}

#[tokio::test]
async fn test_remove_round_drops_cache_entry_too() {
    let e = engine(EmbeddedStrategy::new(MemoryStore::new(), 100));
    e.apply_transaction(request("R1", "T1", TransactionKind::Bet, 10))
        .await
        .unwrap();
    e.round("R1").await.unwrap();

    assert!(e.remove_round("R1").await.unwrap());
    assert!(e.round("R1").await.unwrap().is_none());
}
