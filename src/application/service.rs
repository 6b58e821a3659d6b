use chrono::{DateTime, Datelike, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::domain::{
    invoice_number, order_totals, Business, BusinessId, Cents, Counterparty, Customer, CustomerId,
    CustomerSnapshot, Invoice, InvoiceId, InvoiceStatus, ItemKind, LedgerEntry, MovementKind,
    NewCustomer, NewSupplier, NewWorkOrderItem, Product, ProductGroup, ProductGroupId, ProductId,
    StockMovement, Supplier, SupplierId, WorkOrder, WorkOrderId, WorkOrderItem, WorkOrderItemId,
};
use crate::storage::{self, Repository};

use super::accounts::{self, BalanceMismatch};
use super::error::conflict_on_unique;
use super::stock::{self, MovementRefs, StockMismatch};
use super::AppError;

/// Application service providing high-level operations for the ledger.
/// This is the primary interface for any client (CLI, API, TUI, etc.).
///
/// Every mutating operation runs as one atomic unit: a transaction opened
/// at the start, committed once at the end, rolled back on any error.
pub struct LedgerService {
    repo: Repository,
}

/// Input for receiving stock from a supplier. The product is resolved by
/// case-insensitive name and created on first sight.
pub struct ReceiveStock {
    pub product_name: String,
    pub quantity: i64,
    pub unit_cost: Cents,
    pub supplier_id: Option<SupplierId>,
    pub reference: Option<String>,
}

/// Result of receiving stock
pub struct StockReceipt {
    pub product: Product,
    pub movement: StockMovement,
    pub supplier_entry: Option<LedgerEntry>,
}

/// An account's balance with its full entry history, newest first.
/// A counterparty that never traded reads as zero with no entries.
pub struct AccountStatement {
    pub counterparty: Counterparty,
    pub balance: Cents,
    pub entries: Vec<LedgerEntry>,
}

/// A work order with its lines and invoice, when one has been issued.
pub struct WorkOrderDetail {
    pub order: WorkOrder,
    pub items: Vec<WorkOrderItem>,
    pub invoice: Option<Invoice>,
}

/// Sales against cost of goods over completed work orders.
pub struct GrossProfit {
    pub total_sales: Cents,
    pub total_cogs: Cents,
    pub gross_profit: Cents,
}

/// Every cached aggregate that drifted from its log.
pub struct ConsistencyReport {
    pub balance_mismatches: Vec<BalanceMismatch>,
    pub stock_mismatches: Vec<StockMismatch>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.balance_mismatches.is_empty() && self.stock_mismatches.is_empty()
    }
}

/// How many drifted caches a repair pass rewrote.
pub struct RepairSummary {
    pub accounts_repaired: usize,
    pub products_repaired: usize,
}

impl LedgerService {
    /// Create a new ledger service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Master data
    // ========================

    pub async fn register_business(&self, name: &str) -> Result<Business, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Business name cannot be empty".to_string(),
            ));
        }
        let mut conn = self.repo.acquire().await?;
        Ok(storage::create_business(&mut conn, name).await?)
    }

    pub async fn create_customer(
        &self,
        business_id: BusinessId,
        new: NewCustomer,
    ) -> Result<Customer, AppError> {
        if new.name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Customer name cannot be empty".to_string(),
            ));
        }
        let mut conn = self.repo.acquire().await?;
        Ok(storage::insert_customer(&mut conn, business_id, &new).await?)
    }

    pub async fn create_supplier(
        &self,
        business_id: BusinessId,
        new: NewSupplier,
    ) -> Result<Supplier, AppError> {
        if new.name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Supplier name cannot be empty".to_string(),
            ));
        }
        let mut conn = self.repo.acquire().await?;
        if storage::get_supplier_by_name(&mut conn, business_id, &new.name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Supplier already exists: {}",
                new.name
            )));
        }
        storage::insert_supplier(&mut conn, business_id, &new)
            .await
            .map_err(|err| conflict_on_unique(err, &format!("Supplier already exists: {}", new.name)))
    }

    pub async fn create_product_group(
        &self,
        business_id: BusinessId,
        name: &str,
    ) -> Result<ProductGroup, AppError> {
        let mut conn = self.repo.acquire().await?;
        if storage::get_product_group_by_name(&mut conn, business_id, name)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Product group already exists: {}",
                name
            )));
        }
        storage::insert_product_group(&mut conn, business_id, name)
            .await
            .map_err(|err| conflict_on_unique(err, &format!("Product group already exists: {}", name)))
    }

    pub async fn create_product(
        &self,
        business_id: BusinessId,
        group_id: Option<ProductGroupId>,
        name: &str,
        initial_stock: i64,
        last_unit_cost: Option<Cents>,
    ) -> Result<Product, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Product name cannot be empty".to_string(),
            ));
        }
        if initial_stock < 0 {
            return Err(AppError::InvalidArgument(
                "Initial stock cannot be negative".to_string(),
            ));
        }

        // The opening quantity goes through the movement journal too, so
        // replaying a product's movements always lands on its stock level.
        let mut tx = self.repo.begin().await?;
        let product =
            stock::insert_product(&mut tx, business_id, group_id, name, last_unit_cost).await?;
        if initial_stock > 0 {
            stock::adjust_stock(
                &mut tx,
                business_id,
                product.id,
                MovementKind::ManualAdjust,
                initial_stock,
                None,
                MovementRefs::default(),
                Some("Opening stock"),
            )
            .await?;
        }
        let product = stock::find_product(&mut tx, business_id, product.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product.id)))?;
        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(product)
    }

    // ========================
    // Stock operations
    // ========================

    /// Receive stock into inventory, creating the product on first sight
    /// and charging the supplier's account when one is given.
    pub async fn receive_stock(
        &self,
        business_id: BusinessId,
        input: ReceiveStock,
    ) -> Result<StockReceipt, AppError> {
        if input.quantity <= 0 {
            return Err(AppError::InvalidArgument(
                "Received quantity must be positive".to_string(),
            ));
        }
        if input.unit_cost < 0 {
            return Err(AppError::InvalidArgument(
                "Unit cost cannot be negative".to_string(),
            ));
        }
        if input.product_name.trim().is_empty() {
            return Err(AppError::InvalidArgument(
                "Product name cannot be empty".to_string(),
            ));
        }
        debug!(business_id, product = %input.product_name, quantity = input.quantity, "receiving stock");

        let mut tx = self.repo.begin().await?;

        let product = match stock::find_product_by_name(&mut tx, business_id, &input.product_name)
            .await?
        {
            Some(product) => product,
            None => {
                stock::insert_product(&mut tx, business_id, None, &input.product_name, None)
                    .await?
            }
        };

        let movement = stock::adjust_stock(
            &mut tx,
            business_id,
            product.id,
            MovementKind::PurchaseIn,
            input.quantity,
            Some(input.unit_cost),
            MovementRefs::default(),
            None,
        )
        .await?;

        let supplier_entry = match input.supplier_id {
            Some(supplier_id) => {
                let supplier = storage::get_supplier(&mut tx, business_id, supplier_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Supplier {} not found", supplier_id))
                    })?;
                let total = input.quantity * input.unit_cost;
                let description = format!(
                    "Stock purchase: {} x{}",
                    product.name, input.quantity
                );
                let entry = accounts::apply_entry(
                    &mut tx,
                    business_id,
                    Counterparty::supplier(supplier.id),
                    total,
                    Some(&description),
                    None,
                    input.reference.as_deref(),
                )
                .await?;
                stock::link_movement_to_entry(&mut tx, movement.id, entry.id).await?;
                Some(entry)
            }
            None => None,
        };

        let product = stock::find_product(&mut tx, business_id, product.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product.id)))?;

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(StockReceipt {
            product,
            movement: StockMovement {
                ledger_entry_id: supplier_entry.as_ref().map(|e| e.id),
                ..movement
            },
            supplier_entry,
        })
    }

    /// Hand correction of a stock level, with a mandatory reason.
    /// Never touches the cost snapshot.
    pub async fn adjust_stock_manually(
        &self,
        business_id: BusinessId,
        product_id: ProductId,
        change: i64,
        reason: &str,
    ) -> Result<StockMovement, AppError> {
        debug!(business_id, product_id, change, "manual stock adjustment");
        let mut tx = self.repo.begin().await?;
        let movement = stock::adjust_stock(
            &mut tx,
            business_id,
            product_id,
            MovementKind::ManualAdjust,
            change,
            None,
            MovementRefs::default(),
            Some(reason),
        )
        .await?;
        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(movement)
    }

    // ========================
    // Work orders
    // ========================

    pub async fn start_work_order(
        &self,
        business_id: BusinessId,
        customer_id: Option<CustomerId>,
        notes: Option<&str>,
    ) -> Result<WorkOrder, AppError> {
        let mut tx = self.repo.begin().await?;

        let snapshot = match customer_id {
            Some(id) => {
                let customer = storage::get_customer(&mut tx, business_id, id)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", id)))?;
                Some(customer.name)
            }
            None => None,
        };

        let order =
            storage::insert_work_order(&mut tx, business_id, customer_id, snapshot.as_deref(), notes)
                .await?;
        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(order)
    }

    /// Add a line to an open work order. A product line snapshots the
    /// current cost and consumes stock; insufficient stock aborts the whole
    /// insertion.
    pub async fn add_work_order_item(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
        new: NewWorkOrderItem,
    ) -> Result<WorkOrderItem, AppError> {
        if new.quantity <= 0 {
            return Err(AppError::InvalidArgument(
                "Quantity must be positive".to_string(),
            ));
        }
        if new.unit_price < 0 {
            return Err(AppError::InvalidArgument(
                "Unit price cannot be negative".to_string(),
            ));
        }
        match new.kind {
            ItemKind::Product if new.product_id.is_none() => {
                return Err(AppError::InvalidArgument(
                    "Product lines must reference a product".to_string(),
                ));
            }
            ItemKind::Service if new.product_id.is_some() => {
                return Err(AppError::InvalidArgument(
                    "Service lines cannot reference a product".to_string(),
                ));
            }
            _ => {}
        }
        debug!(business_id, work_order_id, kind = new.kind.as_str(), "adding work order line");

        let mut tx = self.repo.begin().await?;

        let order = storage::get_work_order(&mut tx, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidArgument(format!(
                "Work order {} is {}, lines can only change while OPEN",
                order.id, order.status
            )));
        }

        let cost_at_time = match new.product_id {
            Some(product_id) => {
                let product = stock::find_product(&mut tx, business_id, product_id)
                    .await?
                    .ok_or_else(|| {
                        AppError::NotFound(format!("Product {} not found", product_id))
                    })?;
                product.last_unit_cost
            }
            None => None,
        };

        let total = new.quantity * new.unit_price;
        let item =
            storage::insert_item(&mut tx, business_id, work_order_id, &new, total, cost_at_time)
                .await?;

        if let Some(product_id) = new.product_id {
            stock::adjust_stock(
                &mut tx,
                business_id,
                product_id,
                MovementKind::SaleOut,
                -new.quantity,
                None,
                MovementRefs {
                    work_order_item_id: Some(item.id),
                    ledger_entry_id: None,
                },
                None,
            )
            .await?;
        }

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(item)
    }

    /// Remove a line from an open work order, returning its stock.
    pub async fn remove_work_order_item(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
        item_id: WorkOrderItemId,
    ) -> Result<(), AppError> {
        debug!(business_id, work_order_id, item_id, "removing work order line");
        let mut tx = self.repo.begin().await?;

        let item = storage::get_item_for_removal(&mut tx, business_id, work_order_id, item_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Work order item {} not found", item_id)))?;
        if item.order_status.is_terminal() {
            return Err(AppError::InvalidArgument(format!(
                "Work order {} is {}, lines can only change while OPEN",
                work_order_id, item.order_status
            )));
        }

        if !storage::delete_item(&mut tx, business_id, work_order_id, item_id).await? {
            return Err(AppError::NotFound(format!(
                "Work order item {} not found",
                item_id
            )));
        }

        // Return the stock the line had consumed. The movement cannot
        // reference the line anymore, it is already gone.
        if item.kind == ItemKind::Product && item.quantity > 0 {
            if let Some(product_id) = item.product_id {
                stock::adjust_stock(
                    &mut tx,
                    business_id,
                    product_id,
                    MovementKind::ReturnIn,
                    item.quantity,
                    None,
                    MovementRefs::default(),
                    None,
                )
                .await?;
            }
        }

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    /// Close an open work order: freeze totals from its lines and charge
    /// the customer's account with the grand total.
    pub async fn complete_work_order(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
        vat_override: Option<f64>,
    ) -> Result<WorkOrder, AppError> {
        if let Some(vat) = vat_override {
            if !(0.0..=100.0).contains(&vat) {
                return Err(AppError::InvalidArgument(format!(
                    "VAT percentage out of range: {}",
                    vat
                )));
            }
        }
        debug!(business_id, work_order_id, "completing work order");

        let mut tx = self.repo.begin().await?;

        let order = storage::get_work_order(&mut tx, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;
        if order.status.is_terminal() {
            return Err(AppError::InvalidArgument(format!(
                "Work order {} is already {}",
                order.id, order.status
            )));
        }

        let vat_percent = vat_override.unwrap_or(order.vat_percent);
        let line_totals = storage::item_totals(&mut tx, business_id, work_order_id).await?;
        if line_totals.is_empty() {
            return Err(AppError::InvalidArgument(format!(
                "Work order {} has no lines to complete",
                work_order_id
            )));
        }
        let totals = order_totals(&line_totals, vat_percent);

        if !storage::finalize_work_order(&mut tx, business_id, work_order_id, &totals, vat_percent)
            .await?
        {
            return Err(AppError::Conflict(format!(
                "Work order {} was closed concurrently",
                work_order_id
            )));
        }

        if let Some(customer_id) = order.customer_id {
            if totals.grand_total != 0 {
                let description = format!("Work order #{}", work_order_id);
                accounts::apply_entry(
                    &mut tx,
                    business_id,
                    Counterparty::customer(customer_id),
                    totals.grand_total,
                    Some(&description),
                    Some(work_order_id),
                    None,
                )
                .await?;
            }
        }

        let order = storage::get_work_order(&mut tx, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(order)
    }

    /// Delete a work order, returning the stock its product lines consumed.
    /// Lines and any invoice cascade with the order row.
    pub async fn delete_work_order(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
    ) -> Result<(), AppError> {
        debug!(business_id, work_order_id, "deleting work order");
        let mut tx = self.repo.begin().await?;

        storage::get_work_order(&mut tx, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;

        let lines = storage::product_lines(&mut tx, business_id, work_order_id).await?;
        for (item_id, product_id, quantity) in lines {
            stock::adjust_stock(
                &mut tx,
                business_id,
                product_id,
                MovementKind::ReturnIn,
                quantity,
                None,
                MovementRefs {
                    work_order_item_id: Some(item_id),
                    ledger_entry_id: None,
                },
                None,
            )
            .await?;
        }

        if !storage::delete_work_order_row(&mut tx, business_id, work_order_id).await? {
            return Err(AppError::NotFound(format!(
                "Work order {} not found",
                work_order_id
            )));
        }

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    // ========================
    // Invoices
    // ========================

    /// Issue the invoice for a completed work order. The row, the customer
    /// snapshot and the number stamp are one atomic unit; the invoice
    /// leaves it already SENT.
    pub async fn create_invoice(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
        due_date: Option<NaiveDate>,
        notes: Option<&str>,
    ) -> Result<Invoice, AppError> {
        debug!(business_id, work_order_id, "creating invoice");
        let mut tx = self.repo.begin().await?;

        let order = storage::get_work_order(&mut tx, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;
        if order.status != crate::domain::WorkOrderStatus::Completed {
            return Err(AppError::InvalidArgument(format!(
                "Work order {} is {}, only COMPLETED orders can be invoiced",
                order.id, order.status
            )));
        }
        let customer_id = order.customer_id.ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "Work order {} has no customer to invoice",
                order.id
            ))
        })?;

        if storage::invoice_id_for_order(&mut tx, business_id, work_order_id)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "Work order {} already has an invoice",
                work_order_id
            )));
        }

        let customer = storage::get_customer(&mut tx, business_id, customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", customer_id)))?;
        let snapshot = serde_json::to_string(&CustomerSnapshot::of(&customer))
            .map_err(anyhow::Error::new)?;

        let invoice_id =
            storage::insert_invoice(&mut tx, &order, Some(&snapshot), due_date, notes)
                .await
                .map_err(|err| {
                    conflict_on_unique(
                        err,
                        &format!("Work order {} already has an invoice", work_order_id),
                    )
                })?;

        let number = invoice_number(Utc::now().year(), invoice_id);
        if !storage::stamp_invoice_number(&mut tx, invoice_id, &number).await? {
            return Err(AppError::Storage(anyhow::anyhow!(
                "Invoice {} vanished before numbering",
                invoice_id
            )));
        }

        let invoice = storage::get_invoice(&mut tx, business_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(invoice)
    }

    /// Move an invoice to any of the settable states. PAID keeps or takes a
    /// payment date; leaving PAID clears it.
    pub async fn set_invoice_status(
        &self,
        business_id: BusinessId,
        invoice_id: InvoiceId,
        status: InvoiceStatus,
        payment_date: Option<NaiveDate>,
        notes: Option<&str>,
    ) -> Result<Invoice, AppError> {
        if !status.is_settable() {
            return Err(AppError::InvalidArgument(format!(
                "Invoice status {} cannot be set directly",
                status
            )));
        }
        debug!(business_id, invoice_id, status = status.as_str(), "setting invoice status");

        let mut tx = self.repo.begin().await?;
        let payment_date = if status == InvoiceStatus::Paid {
            payment_date.or_else(|| Some(Utc::now().date_naive()))
        } else {
            None
        };

        if !storage::update_invoice_status(&mut tx, business_id, invoice_id, status, payment_date, notes)
            .await?
        {
            return Err(AppError::NotFound(format!(
                "Invoice {} not found",
                invoice_id
            )));
        }

        let invoice = storage::get_invoice(&mut tx, business_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))?;

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(invoice)
    }

    pub async fn get_invoice(
        &self,
        business_id: BusinessId,
        invoice_id: InvoiceId,
    ) -> Result<Invoice, AppError> {
        let mut conn = self.repo.acquire().await?;
        storage::get_invoice(&mut conn, business_id, invoice_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Invoice {} not found", invoice_id)))
    }

    // ========================
    // Counterparties and their accounts
    // ========================

    /// Record a manual ledger entry (payment, credit, opening balance) for
    /// a counterparty that exists.
    pub async fn record_entry(
        &self,
        business_id: BusinessId,
        counterparty: Counterparty,
        amount: Cents,
        description: Option<&str>,
        external_ref: Option<&str>,
    ) -> Result<LedgerEntry, AppError> {
        if amount == 0 {
            return Err(AppError::InvalidArgument(
                "Entry amount must be non-zero".to_string(),
            ));
        }
        if description.map_or(true, |d| d.trim().is_empty()) {
            return Err(AppError::InvalidArgument(
                "Manual entries require a description".to_string(),
            ));
        }
        debug!(business_id, counterparty = %counterparty, amount, "recording ledger entry");

        let mut tx = self.repo.begin().await?;
        self.require_counterparty(&mut tx, business_id, counterparty)
            .await?;
        let entry = accounts::apply_entry(
            &mut tx,
            business_id,
            counterparty,
            amount,
            description,
            None,
            external_ref,
        )
        .await?;
        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(entry)
    }

    pub async fn account_statement(
        &self,
        business_id: BusinessId,
        counterparty: Counterparty,
    ) -> Result<AccountStatement, AppError> {
        let mut conn = self.repo.acquire().await?;
        let account = accounts::find_account(&mut conn, business_id, counterparty).await?;
        let entries = accounts::list_entries(&mut conn, business_id, counterparty).await?;
        Ok(AccountStatement {
            counterparty,
            balance: account.map_or(0, |a| a.current_balance),
            entries,
        })
    }

    /// Delete a customer. Blocked while their account balance is nonzero;
    /// a zero-balance account goes with them, entries included.
    pub async fn delete_customer(
        &self,
        business_id: BusinessId,
        customer_id: CustomerId,
    ) -> Result<(), AppError> {
        debug!(business_id, customer_id, "deleting customer");
        let mut tx = self.repo.begin().await?;

        let customer = storage::get_customer(&mut tx, business_id, customer_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Customer {} not found", customer_id)))?;

        let counterparty = Counterparty::customer(customer_id);
        self.remove_counterparty_account(&mut tx, business_id, counterparty, &customer.name)
            .await?;

        if !storage::delete_customer_row(&mut tx, business_id, customer_id).await? {
            return Err(AppError::NotFound(format!(
                "Customer {} not found",
                customer_id
            )));
        }

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    /// Delete a supplier, same balance rule as customers.
    pub async fn delete_supplier(
        &self,
        business_id: BusinessId,
        supplier_id: SupplierId,
    ) -> Result<(), AppError> {
        debug!(business_id, supplier_id, "deleting supplier");
        let mut tx = self.repo.begin().await?;

        let supplier = storage::get_supplier(&mut tx, business_id, supplier_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Supplier {} not found", supplier_id)))?;

        let counterparty = Counterparty::supplier(supplier_id);
        self.remove_counterparty_account(&mut tx, business_id, counterparty, &supplier.name)
            .await?;

        if !storage::delete_supplier_row(&mut tx, business_id, supplier_id).await? {
            return Err(AppError::NotFound(format!(
                "Supplier {} not found",
                supplier_id
            )));
        }

        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(())
    }

    async fn remove_counterparty_account(
        &self,
        conn: &mut sqlx::SqliteConnection,
        business_id: BusinessId,
        counterparty: Counterparty,
        name: &str,
    ) -> Result<(), AppError> {
        if let Some(account) = accounts::find_account(conn, business_id, counterparty).await? {
            if account.current_balance != 0 {
                warn!(
                    business_id,
                    counterparty = %counterparty,
                    balance = account.current_balance,
                    "deletion blocked on outstanding balance"
                );
                return Err(AppError::nonzero_balance(name, account.current_balance));
            }
            accounts::remove_account(conn, business_id, counterparty).await?;
        }
        Ok(())
    }

    async fn require_counterparty(
        &self,
        conn: &mut sqlx::SqliteConnection,
        business_id: BusinessId,
        counterparty: Counterparty,
    ) -> Result<(), AppError> {
        let exists = match counterparty.kind {
            crate::domain::CounterpartyKind::Customer => {
                storage::get_customer(conn, business_id, counterparty.id)
                    .await?
                    .is_some()
            }
            crate::domain::CounterpartyKind::Supplier => {
                storage::get_supplier(conn, business_id, counterparty.id)
                    .await?
                    .is_some()
            }
        };
        if exists {
            Ok(())
        } else {
            Err(AppError::NotFound(format!("{} not found", counterparty)))
        }
    }

    // ========================
    // Reads and reporting
    // ========================

    pub async fn get_product(
        &self,
        business_id: BusinessId,
        product_id: ProductId,
    ) -> Result<Product, AppError> {
        let mut conn = self.repo.acquire().await?;
        stock::find_product(&mut conn, business_id, product_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn find_product_by_name(
        &self,
        business_id: BusinessId,
        name: &str,
    ) -> Result<Option<Product>, AppError> {
        let mut conn = self.repo.acquire().await?;
        stock::find_product_by_name(&mut conn, business_id, name).await
    }

    pub async fn find_supplier_by_name(
        &self,
        business_id: BusinessId,
        name: &str,
    ) -> Result<Option<Supplier>, AppError> {
        let mut conn = self.repo.acquire().await?;
        Ok(storage::get_supplier_by_name(&mut conn, business_id, name).await?)
    }

    pub async fn list_products(&self, business_id: BusinessId) -> Result<Vec<Product>, AppError> {
        let mut conn = self.repo.acquire().await?;
        stock::list_products(&mut conn, business_id).await
    }

    pub async fn list_movements(
        &self,
        business_id: BusinessId,
        product_id: ProductId,
    ) -> Result<Vec<StockMovement>, AppError> {
        let mut conn = self.repo.acquire().await?;
        stock::list_movements(&mut conn, business_id, product_id).await
    }

    pub async fn work_order_detail(
        &self,
        business_id: BusinessId,
        work_order_id: WorkOrderId,
    ) -> Result<WorkOrderDetail, AppError> {
        let mut conn = self.repo.acquire().await?;
        let order = storage::get_work_order(&mut conn, business_id, work_order_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!("Work order {} not found", work_order_id))
            })?;
        let items = storage::list_items(&mut conn, business_id, work_order_id).await?;
        let invoice = match storage::invoice_id_for_order(&mut conn, business_id, work_order_id)
            .await?
        {
            Some(invoice_id) => storage::get_invoice(&mut conn, business_id, invoice_id).await?,
            None => None,
        };
        Ok(WorkOrderDetail {
            order,
            items,
            invoice,
        })
    }

    /// Sales against cost of goods over completed work orders, optionally
    /// bounded by creation time.
    pub async fn gross_profit(
        &self,
        business_id: BusinessId,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<GrossProfit, AppError> {
        let mut conn = self.repo.acquire().await?;
        let (total_sales, total_cogs) =
            storage::sales_and_cogs(&mut conn, business_id, from, to).await?;
        Ok(GrossProfit {
            total_sales,
            total_cogs,
            gross_profit: total_sales - total_cogs,
        })
    }

    /// Recompute every cached balance and stock level from its log and
    /// report the ones that drifted. Read-only.
    pub async fn verify_consistency(
        &self,
        business_id: BusinessId,
    ) -> Result<ConsistencyReport, AppError> {
        let mut conn = self.repo.acquire().await?;
        let balance_mismatches = accounts::balance_mismatches(&mut conn, business_id).await?;
        let stock_mismatches = stock::stock_mismatches(&mut conn, business_id).await?;

        if !balance_mismatches.is_empty() || !stock_mismatches.is_empty() {
            warn!(
                business_id,
                accounts = balance_mismatches.len(),
                products = stock_mismatches.len(),
                "cached aggregates drifted from their logs"
            );
        }

        Ok(ConsistencyReport {
            balance_mismatches,
            stock_mismatches,
        })
    }

    /// Rewrite every drifted cache to its replayed value, atomically.
    pub async fn repair_consistency(
        &self,
        business_id: BusinessId,
    ) -> Result<RepairSummary, AppError> {
        let mut tx = self.repo.begin().await?;
        let accounts_repaired = accounts::recompute_balances(&mut tx, business_id).await?;
        let products_repaired = stock::recompute_stock(&mut tx, business_id).await?;
        tx.commit().await.map_err(anyhow::Error::new)?;
        Ok(RepairSummary {
            accounts_repaired,
            products_repaired,
        })
    }
}
