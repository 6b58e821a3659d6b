mod common;

use anyhow::Result;
use registro::application::ReceiveStock;
use registro::domain::{Counterparty, ItemKind, NewWorkOrderItem};

use common::{customer, supplier, test_business};

/// Drive a busy workflow, then replay every log against its cache.
#[tokio::test]
async fn test_caches_match_logs_after_busy_workflow() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let s = service.create_supplier(business, supplier("Bolts Inc")).await?;
    let c = service.create_customer(business, customer("Ada")).await?;

    service
        .receive_stock(
            business,
            ReceiveStock {
                product_name: "Brake Pad".to_string(),
                quantity: 20,
                unit_cost: 2000,
                supplier_id: Some(s.id),
                reference: Some("PO-17".to_string()),
            },
        )
        .await?;
    let product = service
        .find_product_by_name(business, "Brake Pad")
        .await?
        .expect("product");

    // A completed order, a deleted one, a removed line and some manual
    // ledger traffic
    let order = service.start_work_order(business, Some(c.id), None).await?;
    let line = service
        .add_work_order_item(
            business,
            order.id,
            NewWorkOrderItem {
                kind: ItemKind::Product,
                product_id: Some(product.id),
                description: "Pads".to_string(),
                quantity: 4,
                unit_price: 5000,
            },
        )
        .await?;
    service.remove_work_order_item(business, order.id, line.id).await?;
    service
        .add_work_order_item(
            business,
            order.id,
            NewWorkOrderItem {
                kind: ItemKind::Product,
                product_id: Some(product.id),
                description: "Pads".to_string(),
                quantity: 2,
                unit_price: 5000,
            },
        )
        .await?;
    service.complete_work_order(business, order.id, None).await?;

    let scrapped = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(
            business,
            scrapped.id,
            NewWorkOrderItem {
                kind: ItemKind::Product,
                product_id: Some(product.id),
                description: "Pads".to_string(),
                quantity: 3,
                unit_price: 5000,
            },
        )
        .await?;
    service.delete_work_order(business, scrapped.id).await?;

    service
        .record_entry(
            business,
            Counterparty::customer(c.id),
            -5000,
            Some("Partial payment"),
            None,
        )
        .await?;
    service
        .record_entry(
            business,
            Counterparty::supplier(s.id),
            -40000,
            Some("Paid invoice PO-17"),
            None,
        )
        .await?;
    service
        .adjust_stock_manually(business, product.id, -1, "Damaged in handling")
        .await?;

    let report = service.verify_consistency(business).await?;
    assert!(report.is_consistent());
    assert!(report.balance_mismatches.is_empty());
    assert!(report.stock_mismatches.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_repair_is_a_no_op_on_consistent_data() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let c = service.create_customer(business, customer("Ada")).await?;
    service
        .record_entry(business, Counterparty::customer(c.id), 1200, Some("Opening"), None)
        .await?;
    service.create_product(business, None, "Washer", 7, None).await?;

    let summary = service.repair_consistency(business).await?;
    assert_eq!(summary.accounts_repaired, 0);
    assert_eq!(summary.products_repaired, 0);

    // Balances and stock untouched
    assert_eq!(
        service
            .account_statement(business, Counterparty::customer(c.id))
            .await?
            .balance,
        1200
    );
    Ok(())
}

#[tokio::test]
async fn test_failed_operation_leaves_no_partial_writes() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let product = service
        .create_product(business, None, "Washer", 1, None)
        .await?;
    let order = service.start_work_order(business, None, None).await?;

    // Oversell: the whole line insertion must roll back
    let res = service
        .add_work_order_item(
            business,
            order.id,
            NewWorkOrderItem {
                kind: ItemKind::Product,
                product_id: Some(product.id),
                description: "Washers".to_string(),
                quantity: 5,
                unit_price: 100,
            },
        )
        .await;
    assert!(res.is_err());

    let report = service.verify_consistency(business).await?;
    assert!(report.is_consistent());
    let detail = service.work_order_detail(business, order.id).await?;
    assert!(detail.items.is_empty());
    // Only the opening-stock movement; the failed sale left no trace
    assert_eq!(service.list_movements(business, product.id).await?.len(), 1);
    Ok(())
}
