//! Storage seam for the ledger.
//!
//! [`LedgerStore`] hands out [`UnitOfWork`]s: one open database transaction
//! whose writes become visible together on [`UnitOfWork::commit`]. A unit of
//! work that is dropped without being committed is rolled back, which covers
//! early returns, errors, panics and cancelled futures alike.

pub mod memory_ledger_repository;
pub mod pg_ledger_repository;

pub use memory_ledger_repository::{InMemoryLedgerStore, InMemoryUnitOfWork};
pub use pg_ledger_repository::{PgLedgerStore, PgUnitOfWork};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::{Account, AccountId, TransactionKind, TransactionRecord};

#[cfg(test)]
use mockall::automock;

/// Database connection pool type alias.
pub type DbPool = PgPool;

/// Entry point to the account and transaction tables.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Opens a new unit of work.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;

    /// Reads an account outside of any unit of work.
    async fn get_account(&self, account_id: AccountId) -> Result<Account>;

    /// Returns at most `limit` records of the account, newest first.
    ///
    /// An account without history yields an empty vector; an unknown account
    /// yields `NotFound`.
    async fn list_recent_transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>>;

    /// Cheap round-trip used by health checks.
    async fn ping(&self) -> Result<()>;
}

/// A set of reads and writes that commit or roll back as one.
#[async_trait]
pub trait UnitOfWork: Send {
    /// Locks the given account rows for the rest of the unit of work, in the
    /// order given. Fails with `NotFound` if any account is missing.
    async fn lock_accounts(&mut self, account_ids: &[AccountId]) -> Result<()>;

    /// Reads the balance as seen by this unit of work.
    async fn get_balance(&mut self, account_id: AccountId) -> Result<Decimal>;

    /// Applies `balance += delta` and returns the new balance.
    ///
    /// Negative results are not rejected here.
    async fn adjust_balance(&mut self, account_id: AccountId, delta: Decimal) -> Result<Decimal>;

    /// Appends an immutable history record.
    async fn append_transaction(
        &mut self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<TransactionRecord>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
