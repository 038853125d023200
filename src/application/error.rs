use thiserror::Error;

use crate::domain::Cents;

#[derive(Error, Debug)]
pub enum AppError {
    /// Raised for the caller and for a transfer's receiver alike.
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("Insufficient funds: balance {balance}, required {required}")]
    InsufficientFunds { balance: Cents, required: Cents },

    #[error("Statement not found: {0}")]
    StatementNotFound(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Transfer requires a receiving user")]
    MissingCounterparty,

    #[error("Only transfers may name a receiving user")]
    UnexpectedCounterparty,

    #[error("Cannot transfer to the same user")]
    SelfTransfer,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

/// Coarse classification for transport layers mapping errors to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    BadRequest,
    Conflict,
    Internal,
}

impl AppError {
    pub fn class(&self) -> ErrorClass {
        match self {
            AppError::UserNotFound(_) | AppError::StatementNotFound(_) => ErrorClass::NotFound,
            AppError::InsufficientFunds { .. }
            | AppError::InvalidAmount(_)
            | AppError::MissingCounterparty
            | AppError::UnexpectedCounterparty
            | AppError::SelfTransfer => ErrorClass::BadRequest,
            AppError::UserAlreadyExists(_) => ErrorClass::Conflict,
            AppError::Database(_) => ErrorClass::Internal,
        }
    }
}
