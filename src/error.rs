use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::AccountId;

/// Boxed source error carried by storage faults.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by the ledger and its storage layer.
///
/// Only [`LedgerError::Unavailable`] is worth retrying, and even then a retry
/// may apply a deposit or transfer twice if the failed attempt actually
/// committed. Callers that retry must accept that.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid amount {0}: must be positive with at most 4 decimal places and keep balances in range")]
    InvalidAmount(Decimal),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Insufficient funds in account {account_id}: requested {requested}, available {available}")]
    InsufficientFunds {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account {0} not found")]
    NotFound(AccountId),

    #[error("Storage unavailable: {0}")]
    Unavailable(#[source] BoxError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LedgerError {
    pub fn unavailable(source: impl Into<BoxError>) -> Self {
        LedgerError::Unavailable(source.into())
    }

    /// Returns true when the failure may be transient.
    ///
    /// The commit outcome of an `Unavailable` failure is unknown, so retrying
    /// a mutation is not idempotent.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }

    /// Stable machine-readable code used in API responses and metric labels.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::InvalidAmount(_) => "INVALID_AMOUNT",
            LedgerError::InvalidRequest(_) => "INVALID_REQUEST",
            LedgerError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            LedgerError::NotFound(_) => "NOT_FOUND",
            LedgerError::Unavailable(_) => "UNAVAILABLE",
            LedgerError::Validation(_) => "VALIDATION_ERROR",
            LedgerError::Config(_) => "CONFIG_ERROR",
            LedgerError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// SQLSTATE `numeric_value_out_of_range`.
const NUMERIC_OUT_OF_RANGE: &str = "22003";

impl LedgerError {
    /// Maps a failed balance or record write. A `NUMERIC` overflow is caused
    /// by the amount, not by the store, so it is not retryable.
    pub(crate) fn from_write(err: sqlx::Error, amount: Decimal) -> Self {
        let out_of_range = err
            .as_database_error()
            .and_then(|db| db.code())
            .is_some_and(|code| code == NUMERIC_OUT_OF_RANGE);
        if out_of_range {
            LedgerError::InvalidAmount(amount)
        } else {
            LedgerError::from(err)
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Unavailable(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
