pub mod application;
pub mod domain;
pub mod storage;

pub use application::{AppError, LedgerService};
pub use domain::*;
pub use storage::Repository;
