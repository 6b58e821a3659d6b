use chrono::{DateTime, Utc};

use super::{BusinessId, Cents, Counterparty};

/// Running balance for one (business, counterparty) pair.
/// The balance is a materialized cache of the account's ledger entries and
/// must always equal their sum.
#[derive(Debug, Clone)]
pub struct Account {
    pub id: i64,
    pub business_id: BusinessId,
    pub counterparty: Counterparty,
    pub current_balance: Cents,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Immutable signed monetary fact justifying a balance change.
/// Positive increases what is owed, negative is a payment or credit;
/// callers decide direction.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub id: i64,
    pub business_id: BusinessId,
    pub counterparty: Counterparty,
    pub timestamp: DateTime<Utc>,
    pub description: Option<String>,
    pub amount: Cents,
    /// Balance snapshot after this entry was applied.
    pub new_balance: Cents,
    pub work_order_id: Option<i64>,
    pub external_ref: Option<String>,
}

/// Recompute a balance from a full entry history (oldest first).
pub fn replay_balance(entries: &[LedgerEntry]) -> Cents {
    entries.iter().map(|e| e.amount).sum()
}

/// Check each entry's stored `new_balance` against the running sum.
/// Entries must be ordered oldest first.
pub fn entries_consistent(entries: &[LedgerEntry]) -> bool {
    let mut running = 0;
    entries.iter().all(|entry| {
        running += entry.amount;
        entry.new_balance == running
    })
}
