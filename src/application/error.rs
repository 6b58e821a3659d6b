use thiserror::Error;

use crate::domain::Cents;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient stock: available {available}, requested {requested}")]
    InsufficientStock { available: i64, requested: i64 },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Storage(anyhow::Error::new(err))
    }
}

impl AppError {
    pub(crate) fn insufficient_stock(available: i64, requested: i64) -> Self {
        AppError::InsufficientStock {
            available,
            requested,
        }
    }

    pub(crate) fn nonzero_balance(name: &str, balance: Cents) -> Self {
        AppError::Conflict(format!(
            "{} has a non-zero account balance ({}); settle it before deleting",
            name,
            crate::domain::format_cents(balance)
        ))
    }
}

/// Map a storage error to Conflict when a unique constraint fired, keeping
/// everything else as Storage.
pub(crate) fn conflict_on_unique(err: anyhow::Error, message: &str) -> AppError {
    let unique = err
        .downcast_ref::<sqlx::Error>()
        .is_some_and(crate::storage::is_unique_violation);
    if unique {
        AppError::Conflict(message.to_string())
    } else {
        AppError::Storage(err)
    }
}
