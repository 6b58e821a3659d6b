use chrono::{DateTime, Utc};

use super::{BusinessId, Cents};

pub type ProductId = i64;
pub type ProductGroupId = i64;

#[derive(Debug, Clone)]
pub struct ProductGroup {
    pub id: ProductGroupId,
    pub business_id: BusinessId,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inventory item. `current_stock` is a materialized cache of the product's
/// stock movements and must always equal their sum; it never goes negative.
#[derive(Debug, Clone)]
pub struct Product {
    pub id: ProductId,
    pub business_id: BusinessId,
    pub group_id: Option<ProductGroupId>,
    pub name: String,
    pub current_stock: i64,
    /// Updated only by inbound movements that carry a cost.
    pub last_unit_cost: Option<Cents>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKind {
    /// Goods received from a supplier
    PurchaseIn,
    /// Consumed by a work-order line
    SaleOut,
    /// Hand correction, requires a reason
    ManualAdjust,
    /// Returned to stock when a line or work order is removed
    ReturnIn,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::PurchaseIn => "purchase_in",
            MovementKind::SaleOut => "sale_out",
            MovementKind::ManualAdjust => "manual_adjust",
            MovementKind::ReturnIn => "return_in",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "purchase_in" => Some(MovementKind::PurchaseIn),
            "sale_out" => Some(MovementKind::SaleOut),
            "manual_adjust" => Some(MovementKind::ManualAdjust),
            "return_in" => Some(MovementKind::ReturnIn),
            _ => None,
        }
    }

    /// Inbound kinds may update the product's `last_unit_cost`.
    /// A manual adjustment never does, even when positive.
    pub fn is_inbound(&self) -> bool {
        matches!(self, MovementKind::PurchaseIn | MovementKind::ReturnIn)
    }
}

impl std::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable signed quantity fact justifying an inventory change.
/// Positive = inbound, negative = outbound.
#[derive(Debug, Clone)]
pub struct StockMovement {
    pub id: i64,
    pub business_id: BusinessId,
    pub product_id: ProductId,
    pub kind: MovementKind,
    pub quantity: i64,
    pub unit_cost: Option<Cents>,
    pub timestamp: DateTime<Utc>,
    pub work_order_item_id: Option<i64>,
    /// Supplier ledger entry that paid for this movement, when one exists.
    pub ledger_entry_id: Option<i64>,
    pub reason: Option<String>,
}

/// Recompute a stock level from a full movement history (oldest first).
pub fn replay_stock(movements: &[StockMovement]) -> i64 {
    movements.iter().map(|m| m.quantity).sum()
}

/// True when the running stock level never dips below zero.
/// Movements must be ordered oldest first.
pub fn stock_never_negative(movements: &[StockMovement]) -> bool {
    let mut running = 0;
    movements.iter().all(|movement| {
        running += movement.quantity;
        running >= 0
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn movement(quantity: i64) -> StockMovement {
        StockMovement {
            id: 0,
            business_id: 1,
            product_id: 1,
            kind: if quantity >= 0 {
                MovementKind::PurchaseIn
            } else {
                MovementKind::SaleOut
            },
            quantity,
            unit_cost: None,
            timestamp: Utc::now(),
            work_order_item_id: None,
            ledger_entry_id: None,
            reason: None,
        }
    }

    #[test]
    fn test_movement_kind_roundtrip() {
        for kind in [
            MovementKind::PurchaseIn,
            MovementKind::SaleOut,
            MovementKind::ManualAdjust,
            MovementKind::ReturnIn,
        ] {
            assert_eq!(MovementKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(MovementKind::from_str("OUT_SALE"), None);
    }

    #[test]
    fn test_only_real_inbound_kinds_update_cost() {
        assert!(MovementKind::PurchaseIn.is_inbound());
        assert!(MovementKind::ReturnIn.is_inbound());
        assert!(!MovementKind::SaleOut.is_inbound());
        assert!(!MovementKind::ManualAdjust.is_inbound());
    }

    #[test]
    fn test_replay_stock() {
        let movements: Vec<_> = [10, 5, -3, 3].into_iter().map(movement).collect();
        assert_eq!(replay_stock(&movements), 15);
        assert!(stock_never_negative(&movements));
    }

    #[test]
    fn test_transient_negative_is_detected() {
        let movements: Vec<_> = [5, -8, 10].into_iter().map(movement).collect();
        assert_eq!(replay_stock(&movements), 7);
        assert!(!stock_never_negative(&movements));
    }

    proptest! {
        #[test]
        fn replay_equals_sum(quantities in proptest::collection::vec(-50i64..50, 0..64)) {
            let movements: Vec<_> = quantities.iter().copied().map(movement).collect();
            prop_assert_eq!(replay_stock(&movements), quantities.iter().sum::<i64>());
        }
    }
}
