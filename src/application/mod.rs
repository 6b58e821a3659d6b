pub mod accounts;
mod error;
mod service;
pub mod stock;

pub use error::AppError;
pub use service::{
    AccountStatement, ConsistencyReport, GrossProfit, LedgerService, ReceiveStock, RepairSummary,
    StockReceipt, WorkOrderDetail,
};
