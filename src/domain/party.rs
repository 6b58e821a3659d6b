use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BusinessId = i64;
pub type CustomerId = i64;
pub type SupplierId = i64;

/// Tenant boundary: every other entity is scoped by a business id.
#[derive(Debug, Clone)]
pub struct Business {
    pub id: BusinessId,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CounterpartyKind {
    /// Owes the business money (work orders, invoices)
    Customer,
    /// The business owes them money (stock purchases)
    Supplier,
}

impl CounterpartyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterpartyKind::Customer => "customer",
            CounterpartyKind::Supplier => "supplier",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "customer" => Some(CounterpartyKind::Customer),
            "supplier" => Some(CounterpartyKind::Supplier),
            _ => None,
        }
    }
}

impl std::fmt::Display for CounterpartyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer or supplier, each with its own independently-scoped account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Counterparty {
    pub kind: CounterpartyKind,
    pub id: i64,
}

impl Counterparty {
    pub fn customer(id: CustomerId) -> Self {
        Self {
            kind: CounterpartyKind::Customer,
            id,
        }
    }

    pub fn supplier(id: SupplierId) -> Self {
        Self {
            kind: CounterpartyKind::Supplier,
            id,
        }
    }
}

impl std::fmt::Display for Counterparty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: CustomerId,
    pub business_id: BusinessId,
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_no: Option<String>,
    pub tax_office: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct Supplier {
    pub id: SupplierId,
    pub business_id: BusinessId,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for registering a customer.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub tax_no: Option<String>,
    pub tax_office: Option<String>,
}

/// Input for registering a supplier.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSupplier {
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

/// Customer details frozen onto an invoice at creation time.
/// Later edits to the customer never change an issued invoice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub id: CustomerId,
    pub name: String,
    pub address: Option<String>,
    pub tax_no: Option<String>,
    pub tax_office: Option<String>,
}

impl CustomerSnapshot {
    pub fn of(customer: &Customer) -> Self {
        Self {
            id: customer.id,
            name: customer.name.clone(),
            address: customer.address.clone(),
            tax_no: customer.tax_no.clone(),
            tax_office: customer.tax_office.clone(),
        }
    }
}
