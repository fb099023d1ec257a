//! Concurrent load harness for the transaction engine.
//!
//! Spawns many logical clients, each looping back-to-back for a configured
//! duration: pick a transaction kind and amount pseudo-randomly, target a
//! round id that rolls over every 3-5 transactions the way real table play
//! does, apply the transaction, and read the round back to verify the write
//! landed. Latency is measured over the full write-plus-read pair, with no
//! artificial delay between iterations, so the loop runs at the engine's
//! natural throughput.
//!
//! Counts merge additively across clients; percentiles come from pooling
//! every client's samples and sorting once.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;
use wagerline_engine::{ApplyRequest, Engine, Strategy};
use wagerline_types::TransactionKind;

#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Logical clients running concurrently.
    pub clients: usize,
    /// How long each client keeps issuing transactions.
    pub duration: Duration,
    /// Prefix baked into round ids so runs do not collide in the store.
    pub run_id: String,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            clients: 10,
            duration: Duration::from_secs(5),
            run_id: "bench".to_string(),
        }
    }
}

/// Per-client tallies, combined additively into the aggregate.
#[derive(Clone, Debug, Serialize)]
pub struct ClientResult {
    pub client_id: usize,
    pub ops: u64,
    pub successes: u64,
    pub failures: u64,
    /// Operations that committed only after at least one conflict retry.
    pub conflicts_resolved: u64,
    /// Total conflict retries across all operations.
    pub retries: u64,
    pub rounds: u64,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct LatencySummary {
    pub min_ms: f64,
    pub max_ms: f64,
    pub avg_ms: f64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub p99_9_ms: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct AggregatedResult {
    pub strategy: &'static str,
    pub clients: usize,
    pub total_ops: u64,
    pub successes: u64,
    pub failures: u64,
    pub conflicts_resolved: u64,
    pub retries: u64,
    pub rounds: u64,
    pub actual_duration_ms: u64,
    pub throughput_ops_per_sec: f64,
    pub latency: LatencySummary,
    pub per_client: Vec<ClientResult>,
}

impl AggregatedResult {
    pub fn success_rate_percent(&self) -> f64 {
        if self.total_ops == 0 {
            return 0.0;
        }
        self.successes as f64 / self.total_ops as f64 * 100.0
    }

    pub fn log_summary(&self) {
        info!("=== LOAD TEST RESULTS ({}) ===", self.strategy);
        info!(
            "Duration: {:.2}s with {} clients",
            self.actual_duration_ms as f64 / 1000.0,
            self.clients
        );
        info!(
            "Operations: {} total, {} success, {} failed ({:.2}% success)",
            self.total_ops,
            self.successes,
            self.failures,
            self.success_rate_percent()
        );
        info!(
            "Rounds: {}, conflicts resolved: {}, retries: {}",
            self.rounds, self.conflicts_resolved, self.retries
        );
        info!("Throughput: {:.2} ops/sec", self.throughput_ops_per_sec);
        info!(
            "Latency ms: avg {:.3}, p50 {:.3}, p95 {:.3}, p99 {:.3}, p99.9 {:.3}, max {:.3}",
            self.latency.avg_ms,
            self.latency.p50_ms,
            self.latency.p95_ms,
            self.latency.p99_ms,
            self.latency.p99_9_ms,
            self.latency.max_ms
        );
    }
}

/// Run `config.clients` concurrent clients against the engine for the
/// configured duration and aggregate their results.
pub async fn run<P: Strategy>(engine: Arc<Engine<P>>, config: HarnessConfig) -> AggregatedResult {
    let started = Instant::now();
    let deadline = started + config.duration;

    let mut handles = Vec::with_capacity(config.clients);
    for client_id in 0..config.clients {
        let engine = Arc::clone(&engine);
        let run_id = config.run_id.clone();
        handles.push(tokio::spawn(async move {
            run_client(engine, client_id, run_id, deadline).await
        }));
    }

    let mut per_client = Vec::with_capacity(config.clients);
    let mut samples: Vec<Duration> = Vec::new();
    for handle in handles {
        let (result, client_samples) = handle.await.expect("client task panicked");
        samples.extend(client_samples);
        per_client.push(result);
    }
    let actual_duration = started.elapsed();

    aggregate(
        engine.strategy_name(),
        config.clients,
        per_client,
        samples,
        actual_duration,
    )
}

async fn run_client<P: Strategy>(
    engine: Arc<Engine<P>>,
    client_id: usize,
    run_id: String,
    deadline: Instant,
) -> (ClientResult, Vec<Duration>) {
    let mut rng = StdRng::from_entropy();
    let mut samples = Vec::new();
    let mut result = ClientResult {
        client_id,
        ops: 0,
        successes: 0,
        failures: 0,
        conflicts_resolved: 0,
        retries: 0,
        rounds: 0,
    };

    // Round boundaries roll over every 3-5 transactions.
    let mut round_seq = 0u64;
    let mut in_round = 0u32;
    let mut per_round = rng.gen_range(3..=5u32);

    while Instant::now() < deadline {
        if in_round == 0 {
            round_seq += 1;
            per_round = rng.gen_range(3..=5u32);
            result.rounds += 1;
        }
        let round_id = format!("{run_id}_client_{client_id}_round_{round_seq}");
        let request = ApplyRequest {
            round_id: round_id.clone(),
            transaction_id: format!("TXN_{}", Uuid::new_v4().simple()),
            kind: *TransactionKind::ALL
                .choose(&mut rng)
                .expect("kinds are non-empty"),
            amount: Decimal::new(rng.gen_range(100..100_000), 2),
            player_id: format!("player_{client_id}"),
            agent_id: "agent_bench".to_string(),
            note: String::new(),
        };

        // Latency covers the write and the verification read together.
        let op_started = Instant::now();
        let write = engine.apply_transaction(request).await;
        let read = engine.round(&round_id).await;
        samples.push(op_started.elapsed());

        result.ops += 1;
        match write {
            Ok(receipt) => {
                result.retries += receipt.retries as u64;
                if receipt.retries > 0 {
                    result.conflicts_resolved += 1;
                }
                match read {
                    Ok(Some(_)) => result.successes += 1,
                    // A write we confirmed must be readable; anything else
                    // counts against the run.
                    _ => result.failures += 1,
                }
            }
            Err(_) => result.failures += 1,
        }

        in_round += 1;
        if in_round >= per_round {
            in_round = 0;
        }
    }

    (result, samples)
}

fn aggregate(
    strategy: &'static str,
    clients: usize,
    per_client: Vec<ClientResult>,
    mut samples: Vec<Duration>,
    actual_duration: Duration,
) -> AggregatedResult {
    let total_ops: u64 = per_client.iter().map(|c| c.ops).sum();
    let successes: u64 = per_client.iter().map(|c| c.successes).sum();
    let failures: u64 = per_client.iter().map(|c| c.failures).sum();
    let conflicts_resolved: u64 = per_client.iter().map(|c| c.conflicts_resolved).sum();
    let retries: u64 = per_client.iter().map(|c| c.retries).sum();
    let rounds: u64 = per_client.iter().map(|c| c.rounds).sum();

    samples.sort_unstable();
    let latency = latency_summary(&samples);

    let secs = actual_duration.as_secs_f64();
    let throughput_ops_per_sec = if secs > 0.0 {
        total_ops as f64 / secs
    } else {
        0.0
    };

    AggregatedResult {
        strategy,
        clients,
        total_ops,
        successes,
        failures,
        conflicts_resolved,
        retries,
        rounds,
        actual_duration_ms: actual_duration.as_millis() as u64,
        throughput_ops_per_sec,
        latency,
        per_client,
    }
}

fn latency_summary(sorted: &[Duration]) -> LatencySummary {
    if sorted.is_empty() {
        return LatencySummary {
            min_ms: 0.0,
            max_ms: 0.0,
            avg_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            p99_9_ms: 0.0,
        };
    }
    let ms = |d: Duration| d.as_secs_f64() * 1_000.0;
    let total: Duration = sorted.iter().sum();
    LatencySummary {
        min_ms: ms(sorted[0]),
        max_ms: ms(sorted[sorted.len() - 1]),
        avg_ms: ms(total) / sorted.len() as f64,
        p50_ms: ms(percentile(sorted, 0.50)),
        p95_ms: ms(percentile(sorted, 0.95)),
        p99_ms: ms(percentile(sorted, 0.99)),
        p99_9_ms: ms(percentile(sorted, 0.999)),
    }
}

/// Nearest-rank percentile over pre-sorted samples.
fn percentile(sorted: &[Duration], quantile: f64) -> Duration {
    let index = (sorted.len() as f64 * quantile) as usize;
    sorted[index.min(sorted.len() - 1)]
}
