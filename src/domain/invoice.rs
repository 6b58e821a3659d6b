use chrono::{DateTime, NaiveDate, Utc};

use super::{BusinessId, Cents, CustomerId, CustomerSnapshot, WorkOrderId};

pub type InvoiceId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Sent => "SENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Overdue => "OVERDUE",
            InvoiceStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(InvoiceStatus::Draft),
            "SENT" => Some(InvoiceStatus::Sent),
            "PAID" => Some(InvoiceStatus::Paid),
            "OVERDUE" => Some(InvoiceStatus::Overdue),
            "CANCELLED" => Some(InvoiceStatus::Cancelled),
            _ => None,
        }
    }

    /// Statuses callers may set directly. DRAFT only exists transiently at
    /// creation; invoices are promoted to SENT before the creating unit
    /// commits. Any of the four targets is reachable from any prior state.
    pub fn is_settable(&self) -> bool {
        !matches!(self, InvoiceStatus::Draft)
    }
}

impl std::fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Issued bill for a completed work order. At most one per work order.
/// Customer details and totals are frozen at creation time.
#[derive(Debug, Clone)]
pub struct Invoice {
    pub id: InvoiceId,
    pub business_id: BusinessId,
    pub work_order_id: WorkOrderId,
    pub customer_id: Option<CustomerId>,
    pub invoice_number: String,
    pub invoice_date: DateTime<Utc>,
    pub due_date: Option<NaiveDate>,
    pub customer_snapshot: Option<CustomerSnapshot>,
    pub subtotal: Cents,
    pub vat_percent: f64,
    pub vat_amount: Cents,
    pub grand_total: Cents,
    pub status: InvoiceStatus,
    pub payment_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derive an invoice number from the invoice's own row id and the year,
/// e.g. `INV-2026-00042`. No counter table: uniqueness per business follows
/// from the row id being unique, with the (business, number) constraint as
/// a safety net.
pub fn invoice_number(year: i32, invoice_id: InvoiceId) -> String {
    format!("INV-{}-{:05}", year, invoice_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            InvoiceStatus::Draft,
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(InvoiceStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(InvoiceStatus::from_str("sent"), None);
    }

    #[test]
    fn test_draft_is_not_settable() {
        assert!(!InvoiceStatus::Draft.is_settable());
        for status in [
            InvoiceStatus::Sent,
            InvoiceStatus::Paid,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            assert!(status.is_settable());
        }
    }

    #[test]
    fn test_invoice_number_format() {
        assert_eq!(invoice_number(2026, 42), "INV-2026-00042");
        assert_eq!(invoice_number(2026, 1), "INV-2026-00001");
        // Ids beyond the pad width stay unique, just wider
        assert_eq!(invoice_number(2026, 123456), "INV-2026-123456");
    }

    #[test]
    fn test_invoice_numbers_distinct_for_distinct_ids() {
        let numbers: Vec<_> = (1..=100).map(|id| invoice_number(2026, id)).collect();
        let mut unique = numbers.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), numbers.len());
    }
}
