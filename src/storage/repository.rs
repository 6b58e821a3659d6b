use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};

use crate::domain::{
    Business, BusinessId, Cents, Customer, CustomerId, Invoice, InvoiceId, InvoiceStatus, ItemKind,
    NewCustomer, NewSupplier, NewWorkOrderItem, ProductGroup, ProductId, Supplier,
    SupplierId, Totals, WorkOrder, WorkOrderId, WorkOrderItem, WorkOrderItemId, WorkOrderStatus,
    DEFAULT_VAT_PERCENT,
};

use super::MIGRATION_001_INITIAL;

/// Store handle owning the SQLite connection pool.
///
/// All row access goes through explicit connections: reads borrow a pooled
/// connection via [`Repository::acquire`], every multi-step operation runs
/// inside a transaction from [`Repository::begin`] with exactly one commit
/// or rollback.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given path.
    /// Creates the database file if it doesn't exist.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    /// Check out a pooled connection for reads.
    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>> {
        self.pool
            .acquire()
            .await
            .context("Failed to acquire connection")
    }

    /// Open one atomic unit of work. Dropping the transaction without
    /// committing rolls back every write staged in it.
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin transaction")
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)
        .context("Invalid timestamp")?
        .with_timezone(&Utc))
}

pub(crate) fn parse_date_opt(s: Option<String>) -> Result<Option<NaiveDate>> {
    s.map(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").context("Invalid date"))
        .transpose()
}

// ========================
// Businesses
// ========================

pub async fn create_business(conn: &mut SqliteConnection, name: &str) -> Result<Business> {
    let now = Utc::now();
    let done = sqlx::query("INSERT INTO businesses (name, created_at) VALUES (?, ?)")
        .bind(name)
        .bind(now.to_rfc3339())
        .execute(&mut *conn)
        .await
        .context("Failed to create business")?;

    Ok(Business {
        id: done.last_insert_rowid(),
        name: name.to_string(),
        created_at: now,
    })
}

// ========================
// Customers
// ========================

pub async fn insert_customer(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    new: &NewCustomer,
) -> Result<Customer> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO customers (business_id, name, phone, address, tax_no, tax_office, is_active, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, 1, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(&new.name)
    .bind(&new.phone)
    .bind(&new.address)
    .bind(&new.tax_no)
    .bind(&new.tax_office)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert customer")?;

    Ok(Customer {
        id: done.last_insert_rowid(),
        business_id,
        name: new.name.clone(),
        phone: new.phone.clone(),
        address: new.address.clone(),
        tax_no: new.tax_no.clone(),
        tax_office: new.tax_office.clone(),
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_customer(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: CustomerId,
) -> Result<Option<Customer>> {
    let row = sqlx::query("SELECT * FROM customers WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch customer")?;

    row.as_ref().map(row_to_customer).transpose()
}

pub async fn delete_customer_row(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: CustomerId,
) -> Result<bool> {
    let done = sqlx::query("DELETE FROM customers WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete customer")?;
    Ok(done.rows_affected() > 0)
}

fn row_to_customer(row: &sqlx::sqlite::SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: row.get("id"),
        business_id: row.get("business_id"),
        name: row.get("name"),
        phone: row.get("phone"),
        address: row.get("address"),
        tax_no: row.get("tax_no"),
        tax_office: row.get("tax_office"),
        is_active: row.get::<i64, _>("is_active") != 0,
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

// ========================
// Suppliers
// ========================

pub async fn insert_supplier(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    new: &NewSupplier,
) -> Result<Supplier> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO suppliers (business_id, name, contact_person, phone, email, address, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(&new.name)
    .bind(&new.contact_person)
    .bind(&new.phone)
    .bind(&new.email)
    .bind(&new.address)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert supplier")?;

    Ok(Supplier {
        id: done.last_insert_rowid(),
        business_id,
        name: new.name.clone(),
        contact_person: new.contact_person.clone(),
        phone: new.phone.clone(),
        email: new.email.clone(),
        address: new.address.clone(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_supplier(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: SupplierId,
) -> Result<Option<Supplier>> {
    let row = sqlx::query("SELECT * FROM suppliers WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch supplier")?;

    row.as_ref().map(row_to_supplier).transpose()
}

pub async fn get_supplier_by_name(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    name: &str,
) -> Result<Option<Supplier>> {
    let row = sqlx::query("SELECT * FROM suppliers WHERE business_id = ? AND name = ?")
        .bind(business_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch supplier by name")?;

    row.as_ref().map(row_to_supplier).transpose()
}

pub async fn delete_supplier_row(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: SupplierId,
) -> Result<bool> {
    let done = sqlx::query("DELETE FROM suppliers WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete supplier")?;
    Ok(done.rows_affected() > 0)
}

fn row_to_supplier(row: &sqlx::sqlite::SqliteRow) -> Result<Supplier> {
    Ok(Supplier {
        id: row.get("id"),
        business_id: row.get("business_id"),
        name: row.get("name"),
        contact_person: row.get("contact_person"),
        phone: row.get("phone"),
        email: row.get("email"),
        address: row.get("address"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

// ========================
// Product groups
// ========================

pub async fn insert_product_group(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    name: &str,
) -> Result<ProductGroup> {
    let now = Utc::now();
    let done = sqlx::query(
        "INSERT INTO product_groups (business_id, name, created_at, updated_at) VALUES (?, ?, ?, ?)",
    )
    .bind(business_id)
    .bind(name)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert product group")?;

    Ok(ProductGroup {
        id: done.last_insert_rowid(),
        business_id,
        name: name.to_string(),
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_product_group_by_name(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    name: &str,
) -> Result<Option<ProductGroup>> {
    let row = sqlx::query("SELECT * FROM product_groups WHERE business_id = ? AND name = ?")
        .bind(business_id)
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch product group")?;

    match row {
        Some(row) => Ok(Some(ProductGroup {
            id: row.get("id"),
            business_id: row.get("business_id"),
            name: row.get("name"),
            created_at: parse_ts(row.get("created_at"))?,
            updated_at: parse_ts(row.get("updated_at"))?,
        })),
        None => Ok(None),
    }
}

// ========================
// Work orders
// ========================

pub async fn insert_work_order(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    customer_id: Option<CustomerId>,
    customer_name_snapshot: Option<&str>,
    notes: Option<&str>,
) -> Result<WorkOrder> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO work_orders (business_id, customer_id, customer_name_snapshot, notes, vat_percent, status, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, 'OPEN', ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(customer_id)
    .bind(customer_name_snapshot)
    .bind(notes)
    .bind(DEFAULT_VAT_PERCENT)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert work order")?;

    Ok(WorkOrder {
        id: done.last_insert_rowid(),
        business_id,
        customer_id,
        customer_name_snapshot: customer_name_snapshot.map(str::to_string),
        notes: notes.map(str::to_string),
        subtotal: 0,
        vat_percent: DEFAULT_VAT_PERCENT,
        vat_amount: 0,
        grand_total: 0,
        status: WorkOrderStatus::Open,
        created_at: now,
        updated_at: now,
    })
}

pub async fn get_work_order(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: WorkOrderId,
) -> Result<Option<WorkOrder>> {
    let row = sqlx::query("SELECT * FROM work_orders WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch work order")?;

    row.as_ref().map(row_to_work_order).transpose()
}

/// Stamp the frozen totals and flip the order to COMPLETED. Guarded on the
/// current status so a lost write race surfaces as zero affected rows
/// instead of a silent overwrite.
pub async fn finalize_work_order(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: WorkOrderId,
    totals: &Totals,
    vat_percent: f64,
) -> Result<bool> {
    let done = sqlx::query(
        r#"
        UPDATE work_orders
        SET subtotal = ?, vat_percent = ?, vat_amount = ?, grand_total = ?,
            status = 'COMPLETED', updated_at = ?
        WHERE id = ? AND business_id = ? AND status = 'OPEN'
        "#,
    )
    .bind(totals.subtotal)
    .bind(vat_percent)
    .bind(totals.vat_amount)
    .bind(totals.grand_total)
    .bind(Utc::now().to_rfc3339())
    .bind(id)
    .bind(business_id)
    .execute(&mut *conn)
    .await
    .context("Failed to finalize work order")?;

    Ok(done.rows_affected() > 0)
}

pub async fn delete_work_order_row(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: WorkOrderId,
) -> Result<bool> {
    let done = sqlx::query("DELETE FROM work_orders WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .execute(&mut *conn)
        .await
        .context("Failed to delete work order")?;
    Ok(done.rows_affected() > 0)
}

fn row_to_work_order(row: &sqlx::sqlite::SqliteRow) -> Result<WorkOrder> {
    let status_str: String = row.get("status");
    Ok(WorkOrder {
        id: row.get("id"),
        business_id: row.get("business_id"),
        customer_id: row.get("customer_id"),
        customer_name_snapshot: row.get("customer_name_snapshot"),
        notes: row.get("notes"),
        subtotal: row.get("subtotal"),
        vat_percent: row.get("vat_percent"),
        vat_amount: row.get("vat_amount"),
        grand_total: row.get("grand_total"),
        status: WorkOrderStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid work order status: {}", status_str))?,
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

// ========================
// Work order items
// ========================

pub async fn insert_item(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
    new: &NewWorkOrderItem,
    total: Cents,
    cost_at_time: Option<Cents>,
) -> Result<WorkOrderItem> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO work_order_items (business_id, work_order_id, kind, product_id, description, quantity, unit_price, total, cost_at_time, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(business_id)
    .bind(work_order_id)
    .bind(new.kind.as_str())
    .bind(new.product_id)
    .bind(&new.description)
    .bind(new.quantity)
    .bind(new.unit_price)
    .bind(total)
    .bind(cost_at_time)
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert work order item")?;

    Ok(WorkOrderItem {
        id: done.last_insert_rowid(),
        business_id,
        work_order_id,
        kind: new.kind,
        product_id: new.product_id,
        description: new.description.clone(),
        quantity: new.quantity,
        unit_price: new.unit_price,
        total,
        cost_at_time,
        created_at: now,
    })
}

pub async fn list_items(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
) -> Result<Vec<WorkOrderItem>> {
    let rows = sqlx::query(
        "SELECT * FROM work_order_items WHERE work_order_id = ? AND business_id = ? ORDER BY id",
    )
    .bind(work_order_id)
    .bind(business_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to list work order items")?;

    rows.iter().map(row_to_item).collect()
}

pub async fn item_totals(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
) -> Result<Vec<Cents>> {
    let rows = sqlx::query(
        "SELECT total FROM work_order_items WHERE work_order_id = ? AND business_id = ?",
    )
    .bind(work_order_id)
    .bind(business_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to fetch item totals")?;

    Ok(rows.iter().map(|row| row.get("total")).collect())
}

/// What item removal needs to know: the owning order's status and whether
/// the line holds returnable stock.
#[derive(Debug, Clone)]
pub struct ItemForRemoval {
    pub order_status: WorkOrderStatus,
    pub kind: ItemKind,
    pub product_id: Option<ProductId>,
    pub quantity: i64,
}

pub async fn get_item_for_removal(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
    item_id: WorkOrderItemId,
) -> Result<Option<ItemForRemoval>> {
    let row = sqlx::query(
        r#"
        SELECT wo.status AS order_status, i.kind, i.product_id, i.quantity
        FROM work_order_items i
        JOIN work_orders wo ON i.work_order_id = wo.id
        WHERE i.id = ? AND i.work_order_id = ? AND i.business_id = ?
        "#,
    )
    .bind(item_id)
    .bind(work_order_id)
    .bind(business_id)
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to fetch item for removal")?;

    match row {
        Some(row) => {
            let status_str: String = row.get("order_status");
            let kind_str: String = row.get("kind");
            Ok(Some(ItemForRemoval {
                order_status: WorkOrderStatus::from_str(&status_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid work order status: {}", status_str))?,
                kind: ItemKind::from_str(&kind_str)
                    .ok_or_else(|| anyhow::anyhow!("Invalid item kind: {}", kind_str))?,
                product_id: row.get("product_id"),
                quantity: row.get("quantity"),
            }))
        }
        None => Ok(None),
    }
}

pub async fn delete_item(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
    item_id: WorkOrderItemId,
) -> Result<bool> {
    let done = sqlx::query(
        "DELETE FROM work_order_items WHERE id = ? AND work_order_id = ? AND business_id = ?",
    )
    .bind(item_id)
    .bind(work_order_id)
    .bind(business_id)
    .execute(&mut *conn)
    .await
    .context("Failed to delete work order item")?;
    Ok(done.rows_affected() > 0)
}

/// Product-referencing lines with positive quantity, i.e. the lines whose
/// stock must be returned before the order is deleted.
pub async fn product_lines(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
) -> Result<Vec<(WorkOrderItemId, ProductId, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT id, product_id, quantity FROM work_order_items
        WHERE work_order_id = ? AND business_id = ?
          AND kind = 'product' AND product_id IS NOT NULL AND quantity > 0
        "#,
    )
    .bind(work_order_id)
    .bind(business_id)
    .fetch_all(&mut *conn)
    .await
    .context("Failed to fetch product lines")?;

    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("product_id"), row.get("quantity")))
        .collect())
}

fn row_to_item(row: &sqlx::sqlite::SqliteRow) -> Result<WorkOrderItem> {
    let kind_str: String = row.get("kind");
    Ok(WorkOrderItem {
        id: row.get("id"),
        business_id: row.get("business_id"),
        work_order_id: row.get("work_order_id"),
        kind: ItemKind::from_str(&kind_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid item kind: {}", kind_str))?,
        product_id: row.get("product_id"),
        description: row.get("description"),
        quantity: row.get("quantity"),
        unit_price: row.get("unit_price"),
        total: row.get("total"),
        cost_at_time: row.get("cost_at_time"),
        created_at: parse_ts(row.get("created_at"))?,
    })
}

// ========================
// Invoices
// ========================

/// Insert an invoice for a completed order with a placeholder number.
/// The caller stamps the derived number before the transaction commits.
pub async fn insert_invoice(
    conn: &mut SqliteConnection,
    order: &WorkOrder,
    snapshot_json: Option<&str>,
    due_date: Option<NaiveDate>,
    notes: Option<&str>,
) -> Result<InvoiceId> {
    let now = Utc::now();
    let done = sqlx::query(
        r#"
        INSERT INTO invoices (business_id, work_order_id, customer_id, invoice_number, invoice_date, due_date, customer_snapshot,
                              subtotal, vat_percent, vat_amount, grand_total, status, payment_date, notes, created_at, updated_at)
        VALUES (?, ?, ?, 'PENDING', ?, ?, ?, ?, ?, ?, ?, 'SENT', NULL, ?, ?, ?)
        "#,
    )
    .bind(order.business_id)
    .bind(order.id)
    .bind(order.customer_id)
    .bind(now.to_rfc3339())
    .bind(due_date.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(snapshot_json)
    .bind(order.subtotal)
    .bind(order.vat_percent)
    .bind(order.vat_amount)
    .bind(order.grand_total)
    .bind(notes)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *conn)
    .await
    .context("Failed to insert invoice")?;

    Ok(done.last_insert_rowid())
}

pub async fn invoice_id_for_order(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    work_order_id: WorkOrderId,
) -> Result<Option<InvoiceId>> {
    let row = sqlx::query("SELECT id FROM invoices WHERE work_order_id = ? AND business_id = ?")
        .bind(work_order_id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to check for existing invoice")?;

    Ok(row.map(|row| row.get("id")))
}

pub async fn stamp_invoice_number(
    conn: &mut SqliteConnection,
    invoice_id: InvoiceId,
    number: &str,
) -> Result<bool> {
    let done = sqlx::query("UPDATE invoices SET invoice_number = ? WHERE id = ?")
        .bind(number)
        .bind(invoice_id)
        .execute(&mut *conn)
        .await
        .context("Failed to stamp invoice number")?;
    Ok(done.rows_affected() > 0)
}

pub async fn get_invoice(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: InvoiceId,
) -> Result<Option<Invoice>> {
    let row = sqlx::query("SELECT * FROM invoices WHERE id = ? AND business_id = ?")
        .bind(id)
        .bind(business_id)
        .fetch_optional(&mut *conn)
        .await
        .context("Failed to fetch invoice")?;

    row.as_ref().map(row_to_invoice).transpose()
}

/// Apply a status change. A PAID target may carry a payment date (kept if
/// absent); any other target clears it. Notes update in place when given.
pub async fn update_invoice_status(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    id: InvoiceId,
    status: InvoiceStatus,
    payment_date: Option<NaiveDate>,
    notes: Option<&str>,
) -> Result<bool> {
    let now = Utc::now().to_rfc3339();
    let done = if status == InvoiceStatus::Paid {
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = ?, payment_date = COALESCE(?, payment_date),
                notes = COALESCE(?, notes), updated_at = ?
            WHERE id = ? AND business_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(payment_date.map(|d| d.format("%Y-%m-%d").to_string()))
        .bind(notes)
        .bind(&now)
        .bind(id)
        .bind(business_id)
        .execute(&mut *conn)
        .await
    } else {
        sqlx::query(
            r#"
            UPDATE invoices
            SET status = ?, payment_date = NULL,
                notes = COALESCE(?, notes), updated_at = ?
            WHERE id = ? AND business_id = ?
            "#,
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(&now)
        .bind(id)
        .bind(business_id)
        .execute(&mut *conn)
        .await
    }
    .context("Failed to update invoice status")?;

    Ok(done.rows_affected() > 0)
}

fn row_to_invoice(row: &sqlx::sqlite::SqliteRow) -> Result<Invoice> {
    let status_str: String = row.get("status");
    let snapshot_json: Option<String> = row.get("customer_snapshot");
    Ok(Invoice {
        id: row.get("id"),
        business_id: row.get("business_id"),
        work_order_id: row.get("work_order_id"),
        customer_id: row.get("customer_id"),
        invoice_number: row.get("invoice_number"),
        invoice_date: parse_ts(row.get("invoice_date"))?,
        due_date: parse_date_opt(row.get("due_date"))?,
        customer_snapshot: snapshot_json
            .map(|json| serde_json::from_str(&json).context("Invalid customer snapshot"))
            .transpose()?,
        subtotal: row.get("subtotal"),
        vat_percent: row.get("vat_percent"),
        vat_amount: row.get("vat_amount"),
        grand_total: row.get("grand_total"),
        status: InvoiceStatus::from_str(&status_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid invoice status: {}", status_str))?,
        payment_date: parse_date_opt(row.get("payment_date"))?,
        notes: row.get("notes"),
        created_at: parse_ts(row.get("created_at"))?,
        updated_at: parse_ts(row.get("updated_at"))?,
    })
}

// ========================
// Reporting
// ========================

/// Total sales and cost-of-goods over completed work orders, using the
/// `cost_at_time` snapshots so later cost changes don't skew margins.
pub async fn sales_and_cogs(
    conn: &mut SqliteConnection,
    business_id: BusinessId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(Cents, Cents)> {
    let from_str = from.map(|dt| dt.to_rfc3339());
    let to_str = to.map(|dt| dt.to_rfc3339());

    let sales_row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(grand_total), 0) AS total_sales
        FROM work_orders
        WHERE business_id = ? AND status = 'COMPLETED'
          AND (? IS NULL OR created_at >= ?)
          AND (? IS NULL OR created_at <= ?)
        "#,
    )
    .bind(business_id)
    .bind(&from_str)
    .bind(&from_str)
    .bind(&to_str)
    .bind(&to_str)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to compute total sales")?;

    let cogs_row = sqlx::query(
        r#"
        SELECT COALESCE(SUM(i.quantity * i.cost_at_time), 0) AS total_cogs
        FROM work_order_items i
        JOIN work_orders wo ON i.work_order_id = wo.id
        WHERE i.business_id = ? AND wo.status = 'COMPLETED'
          AND i.kind = 'product' AND i.cost_at_time IS NOT NULL
          AND (? IS NULL OR wo.created_at >= ?)
          AND (? IS NULL OR wo.created_at <= ?)
        "#,
    )
    .bind(business_id)
    .bind(&from_str)
    .bind(&from_str)
    .bind(&to_str)
    .bind(&to_str)
    .fetch_one(&mut *conn)
    .await
    .context("Failed to compute cost of goods sold")?;

    Ok((sales_row.get("total_sales"), cogs_row.get("total_cogs")))
}
