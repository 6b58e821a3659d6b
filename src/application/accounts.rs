//! Running-balance accounts for customers and suppliers.
//!
//! Every balance change goes through [`apply_entry`], which appends an
//! immutable ledger entry carrying the post-entry balance snapshot and
//! moves the cached balance in the same step. Replaying a counterparty's
//! entries in insertion order must always land on the cached balance;
//! [`balance_mismatches`] checks that and [`recompute_balances`] repairs it.

use anyhow::Context;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};

use crate::domain::{
    replay_balance, Account, BusinessId, Cents, Counterparty, CounterpartyKind, LedgerEntry,
    WorkOrderId,
};
use crate::storage::parse_ts;

use super::AppError;

/// Fetch the account for a counterparty, creating it lazily with a zero
/// balance on first use. A concurrent insert losing the unique-constraint
/// race falls back to re-reading the winner's row.
pub async fn get_or_create_account(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    counterparty: Counterparty,
) -> Result<Account, AppError> {
    if let Some(account) = find_account(conn, business_id, counterparty).await? {
        return Ok(account);
    }

    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO accounts (business_id, counterparty_kind, counterparty_id, current_balance, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await;

    match inserted {
        Ok(done) => Ok(Account {
            id: done.last_insert_rowid(),
            business_id,
            counterparty,
            current_balance: 0,
            created_at: now,
            updated_at: now,
        }),
        Err(err) if crate::storage::is_unique_violation(&err) => {
            find_account(conn, business_id, counterparty)
                .await?
                .ok_or_else(|| {
                    AppError::Storage(anyhow::anyhow!(
                        "Account for {} vanished after duplicate insert",
                        counterparty
                    ))
                })
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn find_account(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    counterparty: Counterparty,
) -> Result<Option<Account>, AppError> {
    let row = sqlx::query(
        "SELECT * FROM accounts WHERE business_id = ? AND counterparty_kind = ? AND counterparty_id = ?",
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch account")?;

    row.as_ref().map(row_to_account).transpose().map_err(Into::into)
}

/// Append a ledger entry and move the cached balance in one step. The entry
/// records the balance after itself, so the history is auditable without
/// re-summing.
pub async fn apply_entry(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    counterparty: Counterparty,
    amount: Cents,
    description: Option<&str>,
    work_order_id: Option<WorkOrderId>,
    external_ref: Option<&str>,
) -> Result<LedgerEntry, AppError> {
    let account = get_or_create_account(conn, business_id, counterparty).await?;
    let new_balance = account.current_balance + amount;
    let now = Utc::now();

    let done = sqlx::query(
        r#"
        INSERT INTO ledger_entries (business_id, counterparty_kind, counterparty_id, timestamp, description, amount, new_balance, work_order_id, external_ref)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .bind(now.to_rfc3339())
    .bind(description)
    .bind(amount)
    .bind(new_balance)
    .bind(work_order_id)
    .bind(external_ref)
    .execute(&mut *conn)
    .await
    .context("Failed to insert ledger entry")?;

    let updated = sqlx::query(
        "UPDATE accounts SET current_balance = ?, updated_at = ? WHERE id = ?",
    )
    .bind(new_balance)
    .bind(now.to_rfc3339())
    .bind(account.id)
    .execute(&mut *conn)
    .await
    .context("Failed to update account balance")?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Storage(anyhow::anyhow!(
            "Account {} disappeared mid-transaction",
            account.id
        )));
    }

    Ok(LedgerEntry {
        id: done.last_insert_rowid(),
        business_id,
        counterparty,
        timestamp: now,
        description: description.map(str::to_string),
        amount,
        new_balance,
        work_order_id,
        external_ref: external_ref.map(str::to_string),
    })
}

/// Entries for one counterparty, newest first.
pub async fn list_entries(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    counterparty: Counterparty,
) -> Result<Vec<LedgerEntry>, AppError> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM ledger_entries
        WHERE business_id = ? AND counterparty_kind = ? AND counterparty_id = ?
        ORDER BY id DESC
        "#,
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list ledger entries")?;

    rows.iter()
        .map(row_to_entry)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// Drop an account together with its entries. Used when the owning
/// counterparty is deleted; the caller has already checked the balance.
pub async fn remove_account(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    counterparty: Counterparty,
) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM ledger_entries WHERE business_id = ? AND counterparty_kind = ? AND counterparty_id = ?",
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .execute(&mut *conn)
    .await
    .context("Failed to delete ledger entries")?;

    sqlx::query(
        "DELETE FROM accounts WHERE business_id = ? AND counterparty_kind = ? AND counterparty_id = ?",
    )
    .bind(business_id)
    .bind(counterparty.kind.as_str())
    .bind(counterparty.id)
    .execute(&mut *conn)
    .await
    .context("Failed to delete account")?;

    Ok(())
}

/// A cached balance that disagrees with the replay of its entries.
#[derive(Debug, Clone)]
pub struct BalanceMismatch {
    pub counterparty: Counterparty,
    pub stored: Cents,
    pub replayed: Cents,
}

/// Compare every cached balance against the replay of its entries.
pub async fn balance_mismatches(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<Vec<BalanceMismatch>, AppError> {
    let accounts = list_accounts(conn, business_id).await?;

    let mut mismatches = Vec::new();
    for account in accounts {
        let mut entries = list_entries(conn, business_id, account.counterparty).await?;
        entries.reverse(); // replay in insertion order
        let replayed = replay_balance(&entries);
        if replayed != account.current_balance {
            mismatches.push(BalanceMismatch {
                counterparty: account.counterparty,
                stored: account.current_balance,
                replayed,
            });
        }
    }
    Ok(mismatches)
}

/// Rewrite every drifted cached balance to its replayed value. Returns the
/// number of accounts repaired.
pub async fn recompute_balances(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<usize, AppError> {
    let mismatches = balance_mismatches(conn, business_id).await?;
    let now = Utc::now().to_rfc3339();

    for mismatch in &mismatches {
        sqlx::query(
            r#"
            UPDATE accounts SET current_balance = ?, updated_at = ?
            WHERE business_id = ? AND counterparty_kind = ? AND counterparty_id = ?
            "#,
        )
        .bind(mismatch.replayed)
        .bind(&now)
        .bind(business_id)
        .bind(mismatch.counterparty.kind.as_str())
        .bind(mismatch.counterparty.id)
        .execute(&mut *conn)
        .await
        .context("Failed to repair account balance")?;
    }
    Ok(mismatches.len())
}

pub async fn list_accounts(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<Vec<Account>, AppError> {
    let rows = sqlx::query("SELECT * FROM accounts WHERE business_id = ? ORDER BY id")
        .bind(business_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list accounts")?;

    rows.iter()
        .map(row_to_account)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(Into::into)
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Account> {
    let kind_str: String = row.get("counterparty_kind");
    let kind = CounterpartyKind::from_str(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid counterparty kind: {}", kind_str))?;
    Ok(Account {
        id: row.get("id"),
        business_id: row.get("business_id"),
        counterparty: Counterparty {
            kind,
            id: row.get("counterparty_id"),
        },
        current_balance: row.get("current_balance"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<LedgerEntry> {
    let kind_str: String = row.get("counterparty_kind");
    let kind = CounterpartyKind::from_str(&kind_str)
        .ok_or_else(|| anyhow::anyhow!("Invalid counterparty kind: {}", kind_str))?;
    Ok(LedgerEntry {
        id: row.get("id"),
        business_id: row.get("business_id"),
        counterparty: Counterparty {
            kind,
            id: row.get("counterparty_id"),
        },
        timestamp: parse_ts(row.get("timestamp"))?,
        description: row.get("description"),
        amount: row.get("amount"),
        new_balance: row.get("new_balance"),
        work_order_id: row.get("work_order_id"),
        external_ref: row.get("external_ref"),
    })
}
