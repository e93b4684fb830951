use std::sync::Arc;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountId, TransactionKind, TransactionRecord, AMOUNT_SCALE};
use crate::observability::{get_metrics, mask_amount, LatencyTimer};
use crate::repositories::{LedgerStore, UnitOfWork};

/// Upper bound on history page size when none is configured.
pub const DEFAULT_MAX_HISTORY_LIMIT: i64 = 100;

/// Outcome of a committed deposit.
#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub record: TransactionRecord,
}

/// Outcome of a committed transfer.
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
    pub debit: TransactionRecord,
    pub credit: TransactionRecord,
}

/// Lifecycle of a single ledger mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStage {
    Started,
    Validated,
    Applied,
    Committed,
    Aborted,
}

impl OperationStage {
    /// Returns valid next stages from the current one.
    pub fn valid_transitions(self) -> &'static [OperationStage] {
        match self {
            OperationStage::Started => &[OperationStage::Validated, OperationStage::Aborted],
            OperationStage::Validated => &[OperationStage::Applied, OperationStage::Aborted],
            OperationStage::Applied => &[OperationStage::Committed, OperationStage::Aborted],
            OperationStage::Committed => &[],
            OperationStage::Aborted => &[],
        }
    }

    pub fn can_transition(self, to: OperationStage) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub fn is_terminal(self) -> bool {
        self.valid_transitions().is_empty()
    }
}

/// Tracks one operation through its stages and reports the outcome when
/// dropped, including when the owning future is cancelled mid-flight.
struct OperationGuard {
    operation: &'static str,
    stage: OperationStage,
    amount: Decimal,
    failure: Option<&'static str>,
    timer: LatencyTimer,
}

impl OperationGuard {
    fn start(operation: &'static str, amount: Decimal) -> Self {
        tracing::debug!(operation, amount = %mask_amount(&amount), "Ledger operation started");
        Self {
            operation,
            stage: OperationStage::Started,
            amount,
            failure: None,
            timer: LatencyTimer::new(),
        }
    }

    fn advance(&mut self, next: OperationStage) -> Result<()> {
        if !self.stage.can_transition(next) {
            return Err(LedgerError::Internal(anyhow::anyhow!(
                "Invalid {} stage transition from {:?} to {:?}",
                self.operation,
                self.stage,
                next
            )));
        }
        tracing::debug!(operation = self.operation, from = ?self.stage, to = ?next, "Ledger operation advanced");
        self.stage = next;
        Ok(())
    }

    /// Records the result of the operation body.
    fn finish<T>(&mut self, result: &Result<T>) {
        if let Err(e) = result {
            self.failure = Some(e.code());
            if !self.stage.is_terminal() {
                self.stage = OperationStage::Aborted;
            }
        }
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        let metrics = get_metrics();
        match self.stage {
            OperationStage::Committed => {
                metrics.record_operation_committed(self.operation);
                metrics.record_operation_latency(self.operation, self.timer.elapsed_ms());
                metrics.record_amount_moved(self.operation, self.amount.to_f64().unwrap_or_default());
            }
            stage => {
                let reason = self.failure.unwrap_or("CANCELLED");
                metrics.record_operation_aborted(self.operation, reason);
                tracing::info!(
                    operation = self.operation,
                    last_stage = ?stage,
                    reason,
                    "Ledger operation aborted, unit of work rolled back"
                );
            }
        }
    }
}

/// Rejects non-positive amounts and amounts finer than the stored precision,
/// which Postgres would silently round.
fn validate_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO || amount.normalize().scale() > AMOUNT_SCALE {
        return Err(LedgerError::InvalidAmount(amount));
    }
    Ok(())
}

/// Applies deposits and transfers atomically against an injected store.
#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    max_history_limit: i64,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self {
            store,
            max_history_limit: DEFAULT_MAX_HISTORY_LIMIT,
        }
    }

    pub fn with_max_history_limit(mut self, max_history_limit: i64) -> Self {
        self.max_history_limit = max_history_limit;
        self
    }

    pub fn store(&self) -> Arc<dyn LedgerStore> {
        Arc::clone(&self.store)
    }

    /// Credits `amount` to the account and appends a `deposit` record.
    pub async fn deposit(&self, account_id: AccountId, amount: Decimal) -> Result<DepositReceipt> {
        let mut op = OperationGuard::start("deposit", amount);
        let result = self.apply_deposit(&mut op, account_id, amount).await;
        op.finish(&result);
        result
    }

    async fn apply_deposit(
        &self,
        op: &mut OperationGuard,
        account_id: AccountId,
        amount: Decimal,
    ) -> Result<DepositReceipt> {
        validate_amount(amount)?;
        op.advance(OperationStage::Validated)?;

        let mut uow = self.store.begin().await?;
        let balance = uow.adjust_balance(account_id, amount).await?;
        let record = uow
            .append_transaction(account_id, amount, TransactionKind::Deposit)
            .await?;
        op.advance(OperationStage::Applied)?;

        uow.commit().await?;
        op.advance(OperationStage::Committed)?;

        tracing::info!(
            account_id,
            amount = %mask_amount(&amount),
            record_id = record.id,
            "Deposit committed"
        );

        Ok(DepositReceipt {
            account_id,
            balance,
            record,
        })
    }

    /// Moves `amount` from sender to receiver. Both balances and both
    /// history records commit together or not at all.
    pub async fn transfer(
        &self,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        let mut op = OperationGuard::start("transfer", amount);
        let result = self.apply_transfer(&mut op, sender_id, receiver_id, amount).await;
        op.finish(&result);
        result
    }

    async fn apply_transfer(
        &self,
        op: &mut OperationGuard,
        sender_id: AccountId,
        receiver_id: AccountId,
        amount: Decimal,
    ) -> Result<TransferReceipt> {
        validate_amount(amount)?;
        if sender_id == receiver_id {
            return Err(LedgerError::InvalidRequest(format!(
                "Cannot transfer from account {} to itself",
                sender_id
            )));
        }
        op.advance(OperationStage::Validated)?;

        let mut uow = self.store.begin().await?;

        // Rows are always locked in ascending id order.
        let lock_order = [sender_id.min(receiver_id), sender_id.max(receiver_id)];
        uow.lock_accounts(&lock_order).await?;

        let available = uow.get_balance(sender_id).await?;
        if available < amount {
            abandon(uow).await;
            return Err(LedgerError::InsufficientFunds {
                account_id: sender_id,
                available,
                requested: amount,
            });
        }

        let sender_balance = uow.adjust_balance(sender_id, -amount).await?;
        let receiver_balance = uow.adjust_balance(receiver_id, amount).await?;
        let debit = uow
            .append_transaction(sender_id, -amount, TransactionKind::TransferOut)
            .await?;
        let credit = uow
            .append_transaction(receiver_id, amount, TransactionKind::TransferIn)
            .await?;
        op.advance(OperationStage::Applied)?;

        uow.commit().await?;
        op.advance(OperationStage::Committed)?;

        tracing::info!(
            sender_id,
            receiver_id,
            amount = %mask_amount(&amount),
            "Transfer committed"
        );

        Ok(TransferReceipt {
            sender_balance,
            receiver_balance,
            debit,
            credit,
        })
    }

    /// Returns at most `limit` records of the account, newest first.
    pub async fn recent_transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>> {
        if limit < 1 || limit > self.max_history_limit {
            return Err(LedgerError::InvalidRequest(format!(
                "limit must be between 1 and {}, got {}",
                self.max_history_limit, limit
            )));
        }

        let records = self.store.list_recent_transactions(account_id, limit).await?;
        get_metrics().record_history_query(records.len());
        Ok(records)
    }

    pub async fn balance(&self, account_id: AccountId) -> Result<Account> {
        self.store.get_account(account_id).await
    }
}

/// Rolls back a unit of work that found nothing to write.
async fn abandon(uow: Box<dyn UnitOfWork>) {
    if let Err(e) = uow.rollback().await {
        tracing::warn!("Rollback failed after rejected transfer: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::{InMemoryLedgerStore, MockLedgerStore};
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn memory_service() -> (InMemoryLedgerStore, LedgerService) {
        let store = InMemoryLedgerStore::new();
        store.insert_account(1, dec!(100));
        store.insert_account(2, dec!(0));
        let service = LedgerService::new(Arc::new(store.clone()));
        (store, service)
    }

    #[test]
    fn test_stage_transitions() {
        assert!(OperationStage::Started.can_transition(OperationStage::Validated));
        assert!(OperationStage::Started.can_transition(OperationStage::Aborted));
        assert!(OperationStage::Validated.can_transition(OperationStage::Applied));
        assert!(OperationStage::Applied.can_transition(OperationStage::Committed));

        assert!(!OperationStage::Started.can_transition(OperationStage::Committed));
        assert!(!OperationStage::Committed.can_transition(OperationStage::Aborted));
        assert!(OperationStage::Aborted.is_terminal());
    }

    #[test]
    fn test_guard_rejects_skipped_stage() {
        let mut op = OperationGuard::start("deposit", dec!(1));
        assert!(matches!(
            op.advance(OperationStage::Committed),
            Err(LedgerError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_invalid_amount_never_opens_unit_of_work() {
        let mut store = MockLedgerStore::new();
        store.expect_begin().never();
        let service = LedgerService::new(Arc::new(store));

        let err = service.deposit(1, dec!(0)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = service.transfer(1, 2, dec!(-5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[tokio::test]
    async fn test_amount_finer_than_stored_scale_is_rejected() {
        let mut store = MockLedgerStore::new();
        store.expect_begin().never();
        let service = LedgerService::new(Arc::new(store));

        let err = service.deposit(1, dec!(0.00001)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(amount) if amount == dec!(0.00001)));

        let err = service.transfer(1, 2, dec!(1.23456)).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_AMOUNT");
    }

    #[tokio::test]
    async fn test_trailing_zeros_beyond_scale_are_accepted() {
        let (store, service) = memory_service();

        let receipt = service.deposit(1, dec!(1.50000)).await.unwrap();
        assert_eq!(receipt.balance, dec!(101.5));
        service.transfer(1, 2, dec!(0.0001)).await.unwrap();
        assert_eq!(store.balance_of(2), Some(dec!(0.0001)));
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let mut store = MockLedgerStore::new();
        store.expect_begin().never();
        let service = LedgerService::new(Arc::new(store));

        let err = service.transfer(3, 3, dec!(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_begin_failure_is_unavailable() {
        let mut store = MockLedgerStore::new();
        store
            .expect_begin()
            .times(1)
            .returning(|| Err(LedgerError::unavailable("connection refused")));
        let service = LedgerService::new(Arc::new(store));

        let err = service.deposit(1, dec!(10)).await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_history_limit_bounds() {
        let mut store = MockLedgerStore::new();
        store.expect_list_recent_transactions().never();
        let service = LedgerService::new(Arc::new(store)).with_max_history_limit(50);

        assert!(matches!(
            service.recent_transactions(1, 0).await,
            Err(LedgerError::InvalidRequest(_))
        ));
        assert!(matches!(
            service.recent_transactions(1, 51).await,
            Err(LedgerError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_history_reads_through_to_store() {
        let mut store = MockLedgerStore::new();
        store
            .expect_list_recent_transactions()
            .with(eq(7), eq(10))
            .times(1)
            .returning(|_, _| Ok(Vec::new()));
        let service = LedgerService::new(Arc::new(store));

        let records = service.recent_transactions(7, 10).await.unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_balance_reads_through_to_store() {
        let mut store = MockLedgerStore::new();
        store
            .expect_get_account()
            .with(eq(4))
            .returning(|id| Ok(Account::new(id, dec!(12.50))));
        let service = LedgerService::new(Arc::new(store));

        let account = service.balance(4).await.unwrap();
        assert_eq!(account.balance, dec!(12.50));
    }

    #[tokio::test]
    async fn test_deposit_returns_new_balance_and_record() {
        let (store, service) = memory_service();

        let receipt = service.deposit(1, dec!(50)).await.unwrap();
        assert_eq!(receipt.balance, dec!(150));
        assert_eq!(receipt.record.kind, TransactionKind::Deposit);
        assert_eq!(receipt.record.amount, dec!(50));
        assert_eq!(store.balance_of(1), Some(dec!(150)));
    }

    #[tokio::test]
    async fn test_deposit_to_missing_account() {
        let (store, service) = memory_service();

        let err = service.deposit(99, dec!(5)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(99)));
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_writes_signed_records() {
        let (_store, service) = memory_service();

        let receipt = service.transfer(1, 2, dec!(40)).await.unwrap();
        assert_eq!(receipt.sender_balance, dec!(60));
        assert_eq!(receipt.receiver_balance, dec!(40));
        assert_eq!(receipt.debit.amount, dec!(-40));
        assert_eq!(receipt.debit.kind, TransactionKind::TransferOut);
        assert_eq!(receipt.credit.amount, dec!(40));
        assert_eq!(receipt.credit.kind, TransactionKind::TransferIn);
    }

    #[tokio::test]
    async fn test_insufficient_funds_reports_available() {
        let (store, service) = memory_service();

        let err = service.transfer(2, 1, dec!(1)).await.unwrap_err();
        match err {
            LedgerError::InsufficientFunds {
                account_id,
                available,
                requested,
            } => {
                assert_eq!(account_id, 2);
                assert_eq!(available, dec!(0));
                assert_eq!(requested, dec!(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(store.record_count(), 0);
    }

    #[tokio::test]
    async fn test_transfer_to_missing_receiver_writes_nothing() {
        let (store, service) = memory_service();

        let err = service.transfer(1, 42, dec!(10)).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound(42)));
        assert_eq!(store.balance_of(1), Some(dec!(100)));
        assert_eq!(store.record_count(), 0);
    }
}
