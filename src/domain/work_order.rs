use chrono::{DateTime, Utc};

use super::{vat_amount, BusinessId, Cents, CustomerId, ProductId};

pub type WorkOrderId = i64;
pub type WorkOrderItemId = i64;

/// VAT percentage applied to new work orders unless overridden.
pub const DEFAULT_VAT_PERCENT: f64 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOrderStatus {
    Open,
    Completed,
    Cancelled,
}

impl WorkOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkOrderStatus::Open => "OPEN",
            WorkOrderStatus::Completed => "COMPLETED",
            WorkOrderStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(WorkOrderStatus::Open),
            "COMPLETED" => Some(WorkOrderStatus::Completed),
            "CANCELLED" => Some(WorkOrderStatus::Cancelled),
            _ => None,
        }
    }

    /// Completed and cancelled orders never reopen.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkOrderStatus::Open)
    }
}

impl std::fmt::Display for WorkOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Service record for one job. Totals stay zero while OPEN and are frozen
/// when the order completes.
#[derive(Debug, Clone)]
pub struct WorkOrder {
    pub id: WorkOrderId,
    pub business_id: BusinessId,
    pub customer_id: Option<CustomerId>,
    /// Customer name captured when the order was started; survives
    /// customer deletion.
    pub customer_name_snapshot: Option<String>,
    pub notes: Option<String>,
    pub subtotal: Cents,
    pub vat_percent: f64,
    pub vat_amount: Cents,
    pub grand_total: Cents,
    pub status: WorkOrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    /// Labor or other non-stock line
    Service,
    /// Stock-consuming line
    Product,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Service => "service",
            ItemKind::Product => "product",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "service" => Some(ItemKind::Service),
            "product" => Some(ItemKind::Product),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkOrderItem {
    pub id: WorkOrderItemId,
    pub business_id: BusinessId,
    pub work_order_id: WorkOrderId,
    pub kind: ItemKind,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Cents,
    pub total: Cents,
    /// Product cost snapshotted when the line was added, never recomputed.
    /// Keeps margin reporting consistent even if the cost changes later.
    pub cost_at_time: Option<Cents>,
    pub created_at: DateTime<Utc>,
}

/// Input for adding a line to an open work order. `total` and
/// `cost_at_time` are derived, not supplied.
#[derive(Debug, Clone)]
pub struct NewWorkOrderItem {
    pub kind: ItemKind,
    pub product_id: Option<ProductId>,
    pub description: String,
    pub quantity: i64,
    pub unit_price: Cents,
}

/// Monetary totals of a completed work order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Totals {
    pub subtotal: Cents,
    pub vat_amount: Cents,
    pub grand_total: Cents,
}

/// Compute order totals from line totals and a VAT percentage.
pub fn order_totals(line_totals: &[Cents], vat_percent: f64) -> Totals {
    let subtotal: Cents = line_totals.iter().sum();
    let vat = vat_amount(subtotal, vat_percent);
    Totals {
        subtotal,
        vat_amount: vat,
        grand_total: subtotal + vat,
    }
}
