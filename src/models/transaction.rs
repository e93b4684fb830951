use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::AccountId;

/// Kind of ledger movement recorded against an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "transaction_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Funds credited from outside the ledger.
    Deposit,
    /// Debit side of a peer-to-peer transfer.
    TransferOut,
    /// Credit side of a peer-to-peer transfer.
    TransferIn,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::TransferOut => "transfer_out",
            TransactionKind::TransferIn => "transfer_in",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable row of an account's transaction history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TransactionRecord {
    /// Insertion sequence; breaks ties between equal timestamps.
    pub id: i64,
    pub account_id: AccountId,
    /// Positive for credits, negative for debits.
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(
        id: i64,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            amount,
            kind,
            created_at,
        }
    }

    /// Ordering used by history queries: newest first, later insertions
    /// first on equal timestamps.
    pub fn newest_first(a: &TransactionRecord, b: &TransactionRecord) -> std::cmp::Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}
