mod common;

use anyhow::Result;
use registro::application::AppError;
use registro::domain::{entries_consistent, Counterparty};

use common::{customer, supplier, test_business};

#[tokio::test]
async fn test_account_created_lazily_on_first_entry() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;
    let cp = Counterparty::customer(c.id);

    // No trade yet: reads as zero with no entries
    let statement = service.account_statement(business, cp).await?;
    assert_eq!(statement.balance, 0);
    assert!(statement.entries.is_empty());

    let entry = service
        .record_entry(business, cp, 5000, Some("Opening balance"), None)
        .await?;
    assert_eq!(entry.amount, 5000);
    assert_eq!(entry.new_balance, 5000);

    let statement = service.account_statement(business, cp).await?;
    assert_eq!(statement.balance, 5000);
    assert_eq!(statement.entries.len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_entries_carry_running_balance_snapshots() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;
    let cp = Counterparty::customer(c.id);

    for amount in [1000, -300, 250, -950] {
        service
            .record_entry(business, cp, amount, Some("Adjustment"), None)
            .await?;
    }

    let statement = service.account_statement(business, cp).await?;
    assert_eq!(statement.balance, 0);
    assert_eq!(statement.entries.len(), 4);
    // Statement is newest first; snapshots must hold in insertion order
    let mut entries = statement.entries;
    entries.reverse();
    assert!(entries_consistent(&entries));
    assert_eq!(entries.last().unwrap().new_balance, 0);
    Ok(())
}

#[tokio::test]
async fn test_zero_amount_entry_rejected() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;

    let res = service
        .record_entry(business, Counterparty::customer(c.id), 0, Some("Nothing"), None)
        .await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_entry_without_description_rejected() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;

    let res = service
        .record_entry(business, Counterparty::customer(c.id), 100, None, None)
        .await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_entry_for_unknown_counterparty_rejected() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let res = service
        .record_entry(business, Counterparty::customer(999), 100, Some("Ghost"), None)
        .await;
    assert!(matches!(res, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_customer_and_supplier_accounts_are_independent() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Acme")).await?;
    let s = service.create_supplier(business, supplier("Acme")).await?;

    service
        .record_entry(business, Counterparty::customer(c.id), 700, Some("Job"), None)
        .await?;
    service
        .record_entry(business, Counterparty::supplier(s.id), -200, Some("Payment"), None)
        .await?;

    let customer_side = service
        .account_statement(business, Counterparty::customer(c.id))
        .await?;
    let supplier_side = service
        .account_statement(business, Counterparty::supplier(s.id))
        .await?;
    assert_eq!(customer_side.balance, 700);
    assert_eq!(supplier_side.balance, -200);
    Ok(())
}

#[tokio::test]
async fn test_delete_counterparty_blocked_on_nonzero_balance() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;
    let cp = Counterparty::customer(c.id);

    service
        .record_entry(business, cp, 2500, Some("Job"), None)
        .await?;
    let res = service.delete_customer(business, c.id).await;
    assert!(matches!(res, Err(AppError::Conflict(_))));

    // Settle to exactly zero, then deletion succeeds and takes the
    // entries with it
    service
        .record_entry(business, cp, -2500, Some("Payment"), None)
        .await?;
    service.delete_customer(business, c.id).await?;

    let statement = service.account_statement(business, cp).await?;
    assert_eq!(statement.balance, 0);
    assert!(statement.entries.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_delete_supplier_with_zero_balance_and_no_account() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let s = service.create_supplier(business, supplier("Bolts Inc")).await?;

    // Never traded: no account exists, deletion is fine
    service.delete_supplier(business, s.id).await?;
    let res = service.delete_supplier(business, s.id).await;
    assert!(matches!(res, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_duplicate_supplier_name_rejected() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    service.create_supplier(business, supplier("Bolts Inc")).await?;

    let res = service.create_supplier(business, supplier("Bolts Inc")).await;
    assert!(matches!(res, Err(AppError::Conflict(_))));
    Ok(())
}

#[tokio::test]
async fn test_businesses_are_isolated() -> Result<()> {
    let (service, business_a, _temp) = test_business().await?;
    let business_b = service.register_business("Other Garage").await?.id;

    let c = service.create_customer(business_a, customer("Ada")).await?;
    service
        .record_entry(business_a, Counterparty::customer(c.id), 900, Some("Job"), None)
        .await?;

    // The same counterparty id under another business reads as empty
    let foreign = service
        .account_statement(business_b, Counterparty::customer(c.id))
        .await?;
    assert_eq!(foreign.balance, 0);
    assert!(foreign.entries.is_empty());

    let res = service
        .record_entry(business_b, Counterparty::customer(c.id), 100, Some("Job"), None)
        .await;
    assert!(matches!(res, Err(AppError::NotFound(_))));
    Ok(())
}
