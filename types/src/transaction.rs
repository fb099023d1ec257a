use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of monetary event applied to a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionKind {
    Bet,
    Win,
    Bonus,
    Refund,
    Cashout,
}

impl TransactionKind {
    /// All kinds, in wire order. Used by load generators picking uniformly.
    pub const ALL: [TransactionKind; 5] = [
        TransactionKind::Bet,
        TransactionKind::Win,
        TransactionKind::Bonus,
        TransactionKind::Refund,
        TransactionKind::Cashout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Bet => "BET",
            TransactionKind::Win => "WIN",
            TransactionKind::Bonus => "BONUS",
            TransactionKind::Refund => "REFUND",
            TransactionKind::Cashout => "CASHOUT",
        }
    }
}

/// A single monetary event. Immutable once committed to a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    #[serde(default)]
    pub note: String,
    /// Position within the round, assigned on append (1-based). Zero until
    /// the transaction is attached to a round.
    #[serde(default)]
    pub sequence_number: u32,
    /// Millisecond unix timestamp, assigned on append.
    #[serde(default)]
    pub timestamp_ms: u64,
}

impl Transaction {
    pub fn new(transaction_id: impl Into<String>, kind: TransactionKind, amount: Decimal) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            kind,
            amount,
            note: String::new(),
            sequence_number: 0,
            timestamp_ms: 0,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// Lightweight pointer kept in a round document when transaction details are
/// stored under their own keys. Carries enough to enumerate detail documents
/// and to recompute round aggregates without fetching them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRef {
    pub transaction_id: String,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub timestamp_ms: u64,
}

impl TransactionRef {
    pub fn of(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.transaction_id.clone(),
            kind: transaction.kind,
            amount: transaction.amount,
            timestamp_ms: transaction.timestamp_ms,
        }
    }
}
