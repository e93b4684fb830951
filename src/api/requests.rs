use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Body of `POST /users/:id/deposit`.
///
/// Amount positivity is checked by the ledger so that it maps to
/// `INVALID_AMOUNT` rather than a generic validation failure.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DepositRequest {
    pub amount: Decimal,
}

/// Body of `POST /users/transfer`.
///
/// Ids are plain `i64`: the `range` validator only accepts primitive number
/// types, not aliases such as `AccountId`.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferRequest {
    #[validate(range(min = 1, message = "sender_id must be a positive account id"))]
    pub sender_id: i64,
    #[validate(range(min = 1, message = "receiver_id must be a positive account id"))]
    pub receiver_id: i64,
    pub amount: Decimal,
}

/// Query parameters of `GET /users/:id/transactions`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TransactionHistoryQuery {
    pub limit: Option<i64>,
}
