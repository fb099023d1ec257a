//! Domain types for wagerline round ledgers.
//!
//! A [`Round`] is the aggregate document for one gaming session: identity,
//! balances, status, and the monetary events applied to it. Depending on the
//! storage layout, those events are carried either inline as [`Transaction`]s
//! or as lightweight [`TransactionRef`]s pointing at detail documents stored
//! under their own keys.
//!
//! ## Determinism requirements
//! Nothing in this crate reads the clock; timestamps are always passed in by
//! the caller so document contents are reproducible in tests.

use rust_decimal::Decimal;

pub mod round;
pub mod transaction;

pub use round::{Round, RoundStatistics, RoundStatus, RoundSummary};
pub use transaction::{Transaction, TransactionKind, TransactionRef};

/// Balance a round is seeded with when it is created implicitly by its first
/// transaction.
pub fn default_initial_balance() -> Decimal {
    Decimal::from(1000)
}
