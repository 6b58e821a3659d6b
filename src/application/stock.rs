//! Stock levels and the movement journal behind them.
//!
//! [`adjust_stock`] is the single write path for `current_stock`: it
//! validates the projected level, records a movement, and moves the cached
//! level together. Inbound movements that carry a cost also refresh
//! `last_unit_cost`; manual adjustments never touch it and must state a
//! reason.

use anyhow::Context;
use chrono::Utc;
use sqlx::{Row, SqliteConnection};
use tracing::warn;

use crate::domain::{
    replay_stock, BusinessId, Cents, MovementKind, Product, ProductGroupId, ProductId,
    StockMovement, WorkOrderItemId,
};
use crate::storage::parse_ts;

use super::AppError;

/// Everything a stock movement may reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct MovementRefs {
    pub work_order_item_id: Option<WorkOrderItemId>,
    pub ledger_entry_id: Option<i64>,
}

/// Apply a signed stock change to a product. Fails without writing anything
/// when the product is missing, a manual adjustment lacks a reason, or the
/// projected level would go negative.
pub async fn adjust_stock(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    product_id: ProductId,
    kind: MovementKind,
    change: i64,
    unit_cost: Option<Cents>,
    refs: MovementRefs,
    reason: Option<&str>,
) -> Result<StockMovement, AppError> {
    if change == 0 {
        return Err(AppError::InvalidArgument(
            "Stock change must be non-zero".to_string(),
        ));
    }
    if kind == MovementKind::ManualAdjust && reason.map_or(true, |r| r.trim().is_empty()) {
        return Err(AppError::InvalidArgument(
            "Manual stock adjustments require a reason".to_string(),
        ));
    }

    let product = find_product(conn, business_id, product_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))?;

    let projected = product.current_stock + change;
    if projected < 0 {
        warn!(
            business_id,
            product_id,
            available = product.current_stock,
            requested = -change,
            "stock adjustment rejected"
        );
        return Err(AppError::insufficient_stock(product.current_stock, -change));
    }

    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO stock_movements (business_id, product_id, kind, quantity, unit_cost, timestamp, work_order_item_id, ledger_entry_id, reason)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(product_id)
    .bind(kind.as_str())
    .bind(change)
    .bind(unit_cost)
    .bind(now.to_rfc3339())
    .bind(refs.work_order_item_id)
    .bind(refs.ledger_entry_id)
    .bind(reason)
    .execute(&mut *conn)
    .await
    .context("Failed to insert stock movement")?;

    // Only costed inbound movements refresh the cost snapshot.
    let new_cost = match unit_cost {
        Some(cost) if kind.is_inbound() => Some(cost),
        _ => None,
    };
    let updated = if let Some(cost) = new_cost {
        sqlx::query(
            "UPDATE products SET current_stock = ?, last_unit_cost = ?, updated_at = ? WHERE id = ?",
        )
        .bind(projected)
        .bind(cost)
        .bind(now.to_rfc3339())
        .bind(product_id)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query("UPDATE products SET current_stock = ?, updated_at = ? WHERE id = ?")
            .bind(projected)
            .bind(now.to_rfc3339())
            .bind(product_id)
            .execute(&mut *conn)
            .await
    }
    .context("Failed to update product stock")?;

    if updated.rows_affected() == 0 {
        return Err(AppError::Storage(anyhow::anyhow!(
            "Product {} disappeared mid-transaction",
            product_id
        )));
    }

    Ok(StockMovement {
        id: done.last_insert_rowid(),
        business_id,
        product_id,
        kind,
        quantity: change,
        unit_cost,
        timestamp: now,
        work_order_item_id: refs.work_order_item_id,
        ledger_entry_id: refs.ledger_entry_id,
        reason: reason.map(str::to_string),
    })
}

/// Insert a product at stock zero. Opening quantities arrive through
/// [`adjust_stock`] so the movement journal stays authoritative.
pub async fn insert_product(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    group_id: Option<ProductGroupId>,
    name: &str,
    last_unit_cost: Option<Cents>,
) -> Result<Product, AppError> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO products (business_id, group_id, name, current_stock, last_unit_cost, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(group_id)
    .bind(name)
    .bind(last_unit_cost)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .map_err(|err| {
        if crate::storage::is_unique_violation(&err) {
            AppError::Conflict(format!("Product already exists: {}", name))
        } else {
            err.into()
        }
    })?;

    Ok(Product {
        id: done.last_insert_rowid(),
        business_id,
        group_id,
        name: name.to_string(),
        current_stock: 0,
        last_unit_cost,
        created_at: now,
        updated_at: now,
    })
}

pub async fn find_product(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: ProductId,
) -> Result<Option<Product>, AppError> {
    let row = sqlx::query("SELECT * FROM products WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch product")?;

    row.as_ref().map(row_to_product).transpose().map_err(Into::into)
}

/// Name lookup; the column collates case-insensitively.
pub async fn find_product_by_name(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    name: &str,
) -> Result<Option<Product>, AppError> {
    let row = sqlx::query("SELECT * FROM products WHERE business_id = ? AND name = ?")
        .bind(business_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch product by name")?;

    row.as_ref().map(row_to_product).transpose().map_err(Into::into)
}

/// Movements for one product, newest first.
pub async fn list_movements(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    product_id: ProductId,
) -> Result<Vec<StockMovement>, AppError> {
    let rows = sqlx::query(
        "SELECT * FROM stock_movements WHERE business_id = ? AND product_id = ? ORDER BY id DESC",
    )
    .bind(business_id)
    .bind(product_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list stock movements")?;

    rows.iter()
        .map(row_to_movement)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(Into::into)
}

/// A cached stock level that disagrees with the replay of its movements.
#[derive(Debug, Clone)]
pub struct StockMismatch {
    pub product_id: ProductId,
    pub stored: i64,
    pub replayed: i64,
}

/// Compare every cached stock level against the replay of its movements.
pub async fn stock_mismatches(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<Vec<StockMismatch>, AppError> {
    let products = list_products(conn, business_id).await?;

    let mut mismatches = Vec::new();
    for product in products {
        let mut movements = list_movements(conn, business_id, product.id).await?;
        movements.reverse(); // replay in insertion order
        let replayed = replay_stock(&movements);
        if replayed != product.current_stock {
            mismatches.push(StockMismatch {
                product_id: product.id,
                stored: product.current_stock,
                replayed,
            });
        }
    }
    Ok(mismatches)
}

/// Rewrite every drifted cached stock level to its replayed value. Returns
/// the number of products repaired. A replayed level below zero violates
/// the table constraint and surfaces as a storage error.
pub async fn recompute_stock(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<usize, AppError> {
    let mismatches = stock_mismatches(conn, business_id).await?;
    let now = Utc::now().to_rfc3339();

    for mismatch in &mismatches {
        sqlx::query("UPDATE products SET current_stock = ?, updated_at = ? WHERE id = ? AND business_id = ?")
            .bind(mismatch.replayed)
            .bind(&now)
            .bind(mismatch.product_id)
            .bind(business_id)
            .execute(&mut *conn)
            .await
            .context("Failed to repair product stock")?;
    }
    Ok(mismatches.len())
}

/// Point a movement at the ledger entry that paid for it. Used when the
/// entry is written after the movement inside the same atomic unit.
pub async fn link_movement_to_entry(
    conn: &mut SqliteConnection,
    movement_id: i64,
    ledger_entry_id: i64,
) -> Result<(), AppError> {
    sqlx::query("UPDATE stock_movements SET ledger_entry_id = ? WHERE id = ?")
        .bind(ledger_entry_id)
        .bind(movement_id)
        .execute(&mut *conn)
        .await
        .context("Failed to link stock movement to ledger entry")?;
    Ok(())
}

pub async fn list_products(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
) -> Result<Vec<Product>, AppError> {
    let rows = sqlx::query("SELECT * FROM products WHERE business_id = ? ORDER BY name")
        .bind(business_id)
        .fetch_all(&mut *conn)
        .await
        .context("Failed to list products")?;

    rows.iter()
        .map(row_to_product)
        .collect::<anyhow::Result<Vec<_>>>()
        .map_err(Into::into)
}

fn row_to_product(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<Product> {
    Ok(Product {
        id: row.get("id"),
        business_id: row.get("business_id"),
        group_id: row.get("group_id"),
        name: row.get("name"),
        current_stock: row.get("current_stock"),
        last_unit_cost: row.get("last_unit_cost"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

fn row_to_movement(row: &sqlx::sqlite::SqliteRow) -> anyhow::Result<StockMovement> {
    let kind_str: String = row.get("kind");
    Ok(StockMovement {
        id: row.get("id"),
        business_id: row.get("business_id"),
        product_id: row.get("product_id"),
        kind: MovementKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid movement kind: {}", kind_str))?,
        quantity: row.get("quantity"),
        unit_cost: row.get("unit_cost"),
        timestamp: parse_ts(row.get("timestamp"))?,
        work_order_item_id: row.get("work_order_item_id"),
        ledger_entry_id: row.get("ledger_entry_id"),
        reason: row.get("reason"),
    })
}
