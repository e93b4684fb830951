use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::{LedgerStore, UnitOfWork};
use crate::error::{LedgerError, Result};
use crate::models::{Account, AccountId, TransactionKind, TransactionRecord};

struct AccountRow {
    account: Account,
    /// Row lock, held by a unit of work from its first write (or explicit
    /// lock) until it commits or is dropped.
    lock: Arc<AsyncMutex<()>>,
}

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<AccountId, AccountRow>,
    records: Vec<TransactionRecord>,
    next_record_id: i64,
    last_created_at: Option<DateTime<Utc>>,
}

impl LedgerState {
    fn next_record(
        &mut self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
    ) -> TransactionRecord {
        self.next_record_id += 1;
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(created_at);
        TransactionRecord::new(self.next_record_id, account_id, amount, kind, created_at)
    }
}

#[derive(Default)]
struct FaultPlan {
    writes_seen: AtomicUsize,
    /// Write number (1-based, counted from store creation) that fails; 0 disables.
    fail_on_write: AtomicUsize,
    fail_next_commit: AtomicBool,
}

impl FaultPlan {
    fn check_write(&self) -> Result<()> {
        let seen = self.writes_seen.fetch_add(1, Ordering::SeqCst) + 1;
        let target = self.fail_on_write.load(Ordering::SeqCst);
        if target != 0 && seen == target {
            self.fail_on_write.store(0, Ordering::SeqCst);
            return Err(LedgerError::unavailable("injected storage fault on write"));
        }
        Ok(())
    }
}

#[derive(Default)]
struct Inner {
    state: Mutex<LedgerState>,
    faults: FaultPlan,
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Process-local ledger storage with the same isolation guarantees as the
/// PostgreSQL store: per-account row locks held until commit, and writes
/// staged inside the unit of work until they are applied in one step.
///
/// Used by the `memory` storage backend, the test suites and the benches.
/// Fault injection hooks let tests fail a chosen write or commit.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<Inner>,
    latency: Duration,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every unit-of-work call by `latency`, simulating a network
    /// round-trip.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Creates or replaces an account.
    pub fn insert_account(&self, account_id: AccountId, balance: Decimal) -> Account {
        let account = Account::new(account_id, balance);
        self.inner.state().accounts.insert(
            account_id,
            AccountRow {
                account: account.clone(),
                lock: Arc::new(AsyncMutex::new(())),
            },
        );
        account
    }

    /// Makes the `nth` write from now (1-based) fail with `Unavailable`.
    /// Balance adjustments and record appends both count as writes.
    pub fn fail_on_write(&self, nth: usize) {
        let seen = self.inner.faults.writes_seen.load(Ordering::SeqCst);
        self.inner
            .faults
            .fail_on_write
            .store(seen + nth, Ordering::SeqCst);
    }

    /// Makes the next commit fail with `Unavailable`; nothing is applied.
    pub fn fail_next_commit(&self) {
        self.inner.faults.fail_next_commit.store(true, Ordering::SeqCst);
    }

    /// Committed balance of an account.
    pub fn balance_of(&self, account_id: AccountId) -> Option<Decimal> {
        self.inner
            .state()
            .accounts
            .get(&account_id)
            .map(|row| row.account.balance)
    }

    /// Sum of all committed balances.
    pub fn total_balance(&self) -> Decimal {
        self.inner
            .state()
            .accounts
            .values()
            .map(|row| row.account.balance)
            .sum()
    }

    /// Committed records of an account in commit order.
    pub fn records_for(&self, account_id: AccountId) -> Vec<TransactionRecord> {
        self.inner
            .state()
            .records
            .iter()
            .filter(|record| record.account_id == account_id)
            .cloned()
            .collect()
    }

    pub fn record_count(&self) -> usize {
        self.inner.state().records.len()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        Ok(Box::new(InMemoryUnitOfWork {
            inner: Arc::clone(&self.inner),
            latency: self.latency,
            row_locks: BTreeMap::new(),
            staged_deltas: BTreeMap::new(),
            staged_records: Vec::new(),
        }))
    }

    async fn get_account(&self, account_id: AccountId) -> Result<Account> {
        self.inner
            .state()
            .accounts
            .get(&account_id)
            .map(|row| row.account.clone())
            .ok_or(LedgerError::NotFound(account_id))
    }

    async fn list_recent_transactions(
        &self,
        account_id: AccountId,
        limit: i64,
    ) -> Result<Vec<TransactionRecord>> {
        let state = self.inner.state();
        if !state.accounts.contains_key(&account_id) {
            return Err(LedgerError::NotFound(account_id));
        }

        let mut records: Vec<TransactionRecord> = state
            .records
            .iter()
            .filter(|record| record.account_id == account_id)
            .cloned()
            .collect();
        records.sort_by(TransactionRecord::newest_first);
        records.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));

        Ok(records)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Staged writes plus the row locks guarding them. Dropping it discards the
/// staged writes and releases the locks.
pub struct InMemoryUnitOfWork {
    inner: Arc<Inner>,
    latency: Duration,
    row_locks: BTreeMap<AccountId, OwnedMutexGuard<()>>,
    staged_deltas: BTreeMap<AccountId, Decimal>,
    staged_records: Vec<TransactionRecord>,
}

impl InMemoryUnitOfWork {
    async fn round_trip(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn acquire_row(&mut self, account_id: AccountId) -> Result<()> {
        if self.row_locks.contains_key(&account_id) {
            return Ok(());
        }

        let lock = {
            let state = self.inner.state();
            state
                .accounts
                .get(&account_id)
                .map(|row| Arc::clone(&row.lock))
                .ok_or(LedgerError::NotFound(account_id))?
        };

        let guard = lock.lock_owned().await;
        self.row_locks.insert(account_id, guard);
        Ok(())
    }

    fn visible_balance(&self, account_id: AccountId) -> Result<Decimal> {
        let committed = self
            .inner
            .state()
            .accounts
            .get(&account_id)
            .map(|row| row.account.balance)
            .ok_or(LedgerError::NotFound(account_id))?;
        let staged = self
            .staged_deltas
            .get(&account_id)
            .copied()
            .unwrap_or(Decimal::ZERO);
        committed
            .checked_add(staged)
            .ok_or(LedgerError::InvalidAmount(staged))
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn lock_accounts(&mut self, account_ids: &[AccountId]) -> Result<()> {
        self.round_trip().await;
        for account_id in account_ids {
            self.acquire_row(*account_id).await?;
        }
        Ok(())
    }

    async fn get_balance(&mut self, account_id: AccountId) -> Result<Decimal> {
        self.round_trip().await;
        self.visible_balance(account_id)
    }

    async fn adjust_balance(&mut self, account_id: AccountId, delta: Decimal) -> Result<Decimal> {
        self.round_trip().await;
        self.inner.faults.check_write()?;
        self.acquire_row(account_id).await?;

        let new_balance = self
            .visible_balance(account_id)?
            .checked_add(delta)
            .ok_or(LedgerError::InvalidAmount(delta))?;
        let staged = self.staged_deltas.entry(account_id).or_insert(Decimal::ZERO);
        *staged = staged
            .checked_add(delta)
            .ok_or(LedgerError::InvalidAmount(delta))?;
        Ok(new_balance)
    }

    async fn append_transaction(
        &mut self,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
    ) -> Result<TransactionRecord> {
        self.round_trip().await;
        self.inner.faults.check_write()?;

        let record = {
            let mut state = self.inner.state();
            if !state.accounts.contains_key(&account_id) {
                return Err(LedgerError::NotFound(account_id));
            }
            state.next_record(account_id, amount, kind)
        };
        self.staged_records.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.round_trip().await;
        if self.inner.faults.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(LedgerError::unavailable("injected storage fault on commit"));
        }

        let InMemoryUnitOfWork {
            inner,
            row_locks,
            staged_deltas,
            staged_records,
            ..
        } = *self;

        {
            let mut state = inner.state();
            // Compute every new balance before touching any row.
            let mut updates = Vec::with_capacity(staged_deltas.len());
            for (account_id, delta) in &staged_deltas {
                let row = state
                    .accounts
                    .get(account_id)
                    .ok_or(LedgerError::NotFound(*account_id))?;
                let balance = row
                    .account
                    .balance
                    .checked_add(*delta)
                    .ok_or(LedgerError::InvalidAmount(*delta))?;
                updates.push((*account_id, balance));
            }
            for (account_id, balance) in updates {
                if let Some(row) = state.accounts.get_mut(&account_id) {
                    row.account.balance = balance;
                }
            }
            state.records.extend(staged_records);
        }

        drop(row_locks);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}
