// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use registro::application::LedgerService;
use registro::domain::{BusinessId, NewCustomer, NewSupplier};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = LedgerService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// A test service with a business already registered.
pub async fn test_business() -> Result<(LedgerService, BusinessId, TempDir)> {
    let (service, temp) = test_service().await?;
    let business = service.register_business("Test Garage").await?;
    Ok((service, business.id, temp))
}

pub fn customer(name: &str) -> NewCustomer {
    NewCustomer {
        name: name.to_string(),
        phone: None,
        address: Some("1 Main St".to_string()),
        tax_no: None,
        tax_office: None,
    }
}

pub fn supplier(name: &str) -> NewSupplier {
    NewSupplier {
        name: name.to_string(),
        contact_person: None,
        phone: None,
        email: None,
        address: None,
    }
}
