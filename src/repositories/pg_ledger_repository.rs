use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};

use super::{LedgerStore, UnitOfWork};
use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountId, TransactionKind, TransactionRecord};

/// PostgreSQL-backed ledger storage.
#[derive(Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Provisions an account. Accounts are normally created by operators, this
    /// exists for seeding and tests.
    pub async fn create_account(&self, balance: Decimal) -> Result<Account> {
        let row = sqlx::query_as::<_, Account>(
            r#"
            INSERT INTO accounts (balance)
            VALUES ($1)
            RETURNING id, balance, created_at
            "#,
        )
        .bind(balance)
        .fetch_one(&self.pool)
        .await
        .map_err(LedgerError::from)?;

        Ok(row)
    }

    async fn account_exists(&self, account_id: AccountId) -> Result<bool> {
        let row: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(SELECT 1 FROM accounts WHERE id = $1)
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(LedgerError::from)?;

        Ok(row.0)
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let tx = self.pool.begin().await.map_err(LedgerError::from)?;
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account> {
        sqlx::query_as::<_, Account>(
            r#"
            SELECT id, balance, created_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(LedgerError::from)?
        .ok_or(LedgerError::NotFound(account_id))
    }

    async fn list_recent_transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>> {
        if !self.account_exists(account_id).await? {
            return Err(LedgerError::NotFound(account_id));
        }

        let rows = sqlx::query_as::<_, TransactionRecord>(
            r#"
            SELECT id, account_id, amount, kind, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(LedgerError::from)?;

        Ok(rows)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(LedgerError::from)?;
        Ok(())
    }
}

/// One open PostgreSQL transaction. sqlx rolls it back when dropped
/// uncommitted.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_accounts(&mut self, account_ids: &[AccountId]) -> Result<()> {
        let locked: Vec<(AccountId,)> = sqlx::query_as(
            r#"
            SELECT id
            FROM accounts
            WHERE id = ANY($1)
            ORDER BY id
            FOR UPDATE
            "#,
        )
        .bind(account_ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(LedgerError::from)?;

        match account_ids
            .iter()
            .find(|id| !locked.iter().any(|(locked_id,)| locked_id == *id))
        {
            Some(missing) => Err(LedgerError::NotFound(*missing)),
            None => Ok(()),
        }
    }

    async fn get_balance(&mut self, account_id: AccountId) -> Result<Decimal> {
        let row: Option<(Decimal,)> = sqlx::query_as(
            r#"
            SELECT balance
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(LedgerError::from)?;

        row.map(|(balance,)| balance)
            .ok_or(LedgerError::NotFound(account_id))
    }

    async fn adjust_balance(&mut self, account_id: AccountId, delta: Decimal) -> Result<Decimal> {
        let row: Option<(Decimal,)> = sqlx::query_as(
            r#"
            UPDATE accounts
            SET balance = balance + $2
            WHERE id = $1
            RETURNING balance
            "#,
        )
        .bind(account_id)
        .bind(delta)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|err| LedgerError::from_write(err, delta))?;

        row.map(|(balance,)| balance)
            .ok_or(LedgerError::NotFound(account_id))
    }

    async fn append_transaction(
        &mut self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<TransactionRecord> {
        // created_at must follow insertion order; NOW() is fixed at BEGIN.
        let row = sqlx::query_as::<_, TransactionRecord>(
            r#"
            INSERT INTO transactions (account_id, amount, kind, created_at)
            VALUES ($1, $2, $3, clock_timestamp())
            RETURNING id, account_id, amount, kind, created_at
            "#,
        )
        .bind(account_id)
        .bind(amount)
        .bind(kind)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| LedgerError::from_write(err, amount))?;

        Ok(row)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.commit().await.map_err(LedgerError::from)
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let PgUnitOfWork { tx } = *self;
        tx.rollback().await.map_err(LedgerError::from)
    }
}
