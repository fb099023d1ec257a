use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::transaction::{Transaction, TransactionKind, TransactionRef};

/// Lifecycle status of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RoundStatus {
    Active,
    Closed,
}

/// Aggregates recomputed on every append so a round document answers the
/// common questions without walking its transactions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSummary {
    pub total_transactions: usize,
    pub total_bets: Decimal,
    pub total_wins: Decimal,
    pub net_amount: Decimal,
}

/// Point-in-time view of a round's aggregates, for administrative reads.
#[derive(Clone, Debug, Serialize)]
pub struct RoundStatistics {
    pub round_id: String,
    pub status: RoundStatus,
    pub transaction_count: usize,
    pub summary: RoundSummary,
    pub last_updated_ms: u64,
}

/// The aggregate document for one gaming session.
///
/// Exactly one of `transactions` / `transaction_refs` is populated, depending
/// on whether the storage layout embeds details in the round document or
/// keeps them under their own keys.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Round {
    pub round_id: String,
    pub round_number: u32,
    pub player_id: String,
    pub agent_id: String,
    pub initial_balance: Decimal,
    pub balance: Decimal,
    pub status: RoundStatus,
    pub created_at_ms: u64,
    pub last_updated_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transactions: Vec<Transaction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transaction_refs: Vec<TransactionRef>,
    #[serde(default)]
    pub summary: RoundSummary,
}

impl Round {
    pub fn new(
        round_id: impl Into<String>,
        round_number: u32,
        player_id: impl Into<String>,
        agent_id: impl Into<String>,
        initial_balance: Decimal,
        now_ms: u64,
    ) -> Self {
        Self {
            round_id: round_id.into(),
            round_number,
            player_id: player_id.into(),
            agent_id: agent_id.into(),
            initial_balance,
            balance: initial_balance,
            status: RoundStatus::Active,
            created_at_ms: now_ms,
            last_updated_ms: now_ms,
            transactions: Vec::new(),
            transaction_refs: Vec::new(),
            summary: RoundSummary::default(),
        }
    }

    /// Number of transactions attached to this round, regardless of layout.
    pub fn transaction_count(&self) -> usize {
        self.transactions.len() + self.transaction_refs.len()
    }

    pub fn contains_transaction(&self, transaction_id: &str) -> bool {
        self.transactions
            .iter()
            .any(|t| t.transaction_id == transaction_id)
            || self
                .transaction_refs
                .iter()
                .any(|r| r.transaction_id == transaction_id)
    }

    /// Append an inline transaction: assigns its sequence number and
    /// timestamp, moves the balance, and refreshes the aggregates.
    ///
    /// Callers are responsible for duplicate and capacity checks; this method
    /// only mutates.
    pub fn append_transaction(&mut self, mut transaction: Transaction, now_ms: u64) {
        transaction.sequence_number = self.transactions.len() as u32 + 1;
        transaction.timestamp_ms = now_ms;
        self.apply_balance(transaction.kind, transaction.amount);
        self.transactions.push(transaction);
        self.recompute_summary();
        self.last_updated_ms = now_ms;
    }

    /// Append a detail-document pointer: moves the balance and refreshes the
    /// aggregates from the ref list.
    pub fn append_transaction_ref(&mut self, reference: TransactionRef, now_ms: u64) {
        self.apply_balance(reference.kind, reference.amount);
        self.transaction_refs.push(reference);
        self.recompute_summary();
        self.last_updated_ms = now_ms;
    }

    pub fn statistics(&self) -> RoundStatistics {
        RoundStatistics {
            round_id: self.round_id.clone(),
            status: self.status,
            transaction_count: self.transaction_count(),
            summary: self.summary.clone(),
            last_updated_ms: self.last_updated_ms,
        }
    }

    // Settlement rules: bets debit the round balance, wins and refunds credit
    // it. Bonuses and cashouts settle outside the round balance.
    fn apply_balance(&mut self, kind: TransactionKind, amount: Decimal) {
        match kind {
            TransactionKind::Bet => self.balance -= amount,
            TransactionKind::Win | TransactionKind::Refund => self.balance += amount,
            TransactionKind::Bonus | TransactionKind::Cashout => {}
        }
    }

    fn recompute_summary(&mut self) {
        let amounts = |kind: TransactionKind| -> Decimal {
            self.transactions
                .iter()
                .filter(|t| t.kind == kind)
                .map(|t| t.amount)
                .chain(
                    self.transaction_refs
                        .iter()
                        .filter(|r| r.kind == kind)
                        .map(|r| r.amount),
                )
                .sum()
        };
        let total_bets = amounts(TransactionKind::Bet);
        let total_wins = amounts(TransactionKind::Win);
        self.summary = RoundSummary {
            total_transactions: self.transaction_count(),
            total_bets,
            total_wins,
            net_amount: total_wins - total_bets,
        };
    }
}
