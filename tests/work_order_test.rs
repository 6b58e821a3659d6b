mod common;

use anyhow::Result;
use registro::application::{AppError, ReceiveStock};
use registro::domain::{Counterparty, ItemKind, NewWorkOrderItem, WorkOrderStatus};

use common::{customer, supplier, test_business};

fn product_line(product_id: i64, quantity: i64, unit_price: i64) -> NewWorkOrderItem {
    NewWorkOrderItem {
        kind: ItemKind::Product,
        product_id: Some(product_id),
        description: "Part".to_string(),
        quantity,
        unit_price,
    }
}

fn service_line(description: &str, unit_price: i64) -> NewWorkOrderItem {
    NewWorkOrderItem {
        kind: ItemKind::Service,
        product_id: None,
        description: description.to_string(),
        quantity: 1,
        unit_price,
    }
}

/// The full flow: receive stock, consume and return it on an order, then
/// complete with a service line and charge the customer.
#[tokio::test]
async fn test_order_lifecycle_moves_stock_and_balances_together() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let s = service.create_supplier(business, supplier("Bolts Inc")).await?;
    let c = service.create_customer(business, customer("Ada")).await?;
    let product = service
        .create_product(business, None, "Brake Pad", 10, None)
        .await?;

    service
        .receive_stock(
            business,
            ReceiveStock {
                product_name: "Brake Pad".to_string(),
                quantity: 5,
                unit_cost: 2000,
                supplier_id: Some(s.id),
                reference: None,
            },
        )
        .await?;
    let refreshed = service.get_product(business, product.id).await?;
    assert_eq!(refreshed.current_stock, 15);
    assert_eq!(refreshed.last_unit_cost, Some(2000));
    assert_eq!(
        service
            .account_statement(business, Counterparty::supplier(s.id))
            .await?
            .balance,
        10000
    );

    let order = service.start_work_order(business, Some(c.id), None).await?;
    assert_eq!(order.status, WorkOrderStatus::Open);
    assert_eq!(order.customer_name_snapshot.as_deref(), Some("Ada"));

    let item = service
        .add_work_order_item(business, order.id, product_line(product.id, 3, 5000))
        .await?;
    assert_eq!(item.cost_at_time, Some(2000));
    assert_eq!(service.get_product(business, product.id).await?.current_stock, 12);

    service
        .remove_work_order_item(business, order.id, item.id)
        .await?;
    assert_eq!(service.get_product(business, product.id).await?.current_stock, 15);

    service
        .add_work_order_item(business, order.id, service_line("Labor", 8000))
        .await?;
    let completed = service.complete_work_order(business, order.id, None).await?;
    assert_eq!(completed.status, WorkOrderStatus::Completed);
    assert_eq!(completed.subtotal, 8000);
    assert_eq!(completed.vat_amount, 1600);
    assert_eq!(completed.grand_total, 9600);

    let statement = service
        .account_statement(business, Counterparty::customer(c.id))
        .await?;
    assert_eq!(statement.balance, 9600);
    assert_eq!(statement.entries[0].work_order_id, Some(order.id));
    Ok(())
}

#[tokio::test]
async fn test_lines_only_change_while_open() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let order = service.start_work_order(business, None, None).await?;
    let item = service
        .add_work_order_item(business, order.id, service_line("Labor", 1000))
        .await?;
    service.complete_work_order(business, order.id, None).await?;

    let res = service
        .add_work_order_item(business, order.id, service_line("More labor", 500))
        .await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));

    let res = service.remove_work_order_item(business, order.id, item.id).await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_insufficient_stock_aborts_whole_line() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let product = service
        .create_product(business, None, "Washer", 2, None)
        .await?;
    let order = service.start_work_order(business, None, None).await?;

    let res = service
        .add_work_order_item(business, order.id, product_line(product.id, 5, 100))
        .await;
    assert!(matches!(res, Err(AppError::InsufficientStock { .. })));

    // The line must not be left half-created
    let detail = service.work_order_detail(business, order.id).await?;
    assert!(detail.items.is_empty());
    assert_eq!(service.get_product(business, product.id).await?.current_stock, 2);
    Ok(())
}

#[tokio::test]
async fn test_completing_twice_fails() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let order = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(business, order.id, service_line("Labor", 1000))
        .await?;
    service.complete_work_order(business, order.id, None).await?;

    let res = service.complete_work_order(business, order.id, None).await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));
    Ok(())
}

#[tokio::test]
async fn test_completing_empty_order_fails() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let order = service.start_work_order(business, None, None).await?;

    let res = service.complete_work_order(business, order.id, None).await;
    assert!(matches!(res, Err(AppError::InvalidArgument(_))));

    let detail = service.work_order_detail(business, order.id).await?;
    assert_eq!(detail.order.status, WorkOrderStatus::Open);
    Ok(())
}

#[tokio::test]
async fn test_vat_override_applies_to_totals() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let order = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(business, order.id, service_line("Labor", 10000))
        .await?;

    let completed = service
        .complete_work_order(business, order.id, Some(10.0))
        .await?;
    assert_eq!(completed.vat_percent, 10.0);
    assert_eq!(completed.vat_amount, 1000);
    assert_eq!(completed.grand_total, 11000);
    Ok(())
}

#[tokio::test]
async fn test_completing_without_customer_charges_nobody() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let order = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(business, order.id, service_line("Labor", 4000))
        .await?;

    let completed = service.complete_work_order(business, order.id, None).await?;
    assert_eq!(completed.grand_total, 4800);
    // Nothing to assert against an account; completing must simply succeed
    Ok(())
}

#[tokio::test]
async fn test_delete_order_returns_stock() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    let product = service
        .create_product(business, None, "Washer", 10, None)
        .await?;
    let order = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(business, order.id, product_line(product.id, 4, 100))
        .await?;
    assert_eq!(service.get_product(business, product.id).await?.current_stock, 6);

    service.delete_work_order(business, order.id).await?;
    assert_eq!(service.get_product(business, product.id).await?.current_stock, 10);

    let res = service.work_order_detail(business, order.id).await;
    assert!(matches!(res, Err(AppError::NotFound(_))));
    Ok(())
}

#[tokio::test]
async fn test_cost_snapshot_survives_later_price_changes() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    service
        .receive_stock(
            business,
            ReceiveStock {
                product_name: "Brake Pad".to_string(),
                quantity: 10,
                unit_cost: 2000,
                supplier_id: None,
                reference: None,
            },
        )
        .await?;
    let product = service
        .find_product_by_name(business, "Brake Pad")
        .await?
        .expect("product");

    let order = service.start_work_order(business, None, None).await?;
    let item = service
        .add_work_order_item(business, order.id, product_line(product.id, 2, 3000))
        .await?;
    assert_eq!(item.cost_at_time, Some(2000));

    // A later, pricier delivery must not rewrite the snapshot
    service
        .receive_stock(
            business,
            ReceiveStock {
                product_name: "Brake Pad".to_string(),
                quantity: 5,
                unit_cost: 2600,
                supplier_id: None,
                reference: None,
            },
        )
        .await?;
    let detail = service.work_order_detail(business, order.id).await?;
    assert_eq!(detail.items[0].cost_at_time, Some(2000));
    Ok(())
}

#[tokio::test]
async fn test_gross_profit_uses_cost_snapshots() -> Result<()> {
    let (service, business, _temp) = test_business().await?;
    service
        .receive_stock(
            business,
            ReceiveStock {
                product_name: "Brake Pad".to_string(),
                quantity: 10,
                unit_cost: 2000,
                supplier_id: None,
                reference: None,
            },
        )
        .await?;
    let product = service
        .find_product_by_name(business, "Brake Pad")
        .await?
        .expect("product");

    let order = service.start_work_order(business, None, None).await?;
    service
        .add_work_order_item(business, order.id, product_line(product.id, 2, 5000))
        .await?;
    service.complete_work_order(business, order.id, Some(0.0)).await?;

    let profit = service.gross_profit(business, None, None).await?;
    assert_eq!(profit.total_sales, 10000);
    assert_eq!(profit.total_cogs, 4000);
    assert_eq!(profit.gross_profit, 6000);
    Ok(())
}
