use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Identifier of a user account (`accounts.id`).
pub type AccountId = i64;

/// Decimal places kept by `NUMERIC(20, 4)` balance and amount columns.
pub const AMOUNT_SCALE: u32 = 4;

/// A user account holding a single balance.
///
/// Accounts are provisioned outside the ledger. The balance is only ever
/// changed by a committed deposit or transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Account {
    pub id: AccountId,
    pub balance: Decimal,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(id: AccountId, balance: Decimal) -> Self {
        Self {
            id,
            balance,
            created_at: Utc::now(),
        }
    }
}
