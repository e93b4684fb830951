#![allow(dead_code)]

use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use wallet_ledger::models::AccountId;
use wallet_ledger::repositories::InMemoryLedgerStore;
use wallet_ledger::services::LedgerService;

/// In-memory store seeded with `accounts`, plus a service over it.
pub fn memory_ledger(accounts: &[(AccountId, Decimal)]) -> (InMemoryLedgerStore, LedgerService) {
    seeded(InMemoryLedgerStore::new(), accounts)
}

/// Like [`memory_ledger`], with every store round-trip delayed by `latency`.
pub fn slow_memory_ledger(
    accounts: &[(AccountId, Decimal)],
    latency: Duration,
) -> (InMemoryLedgerStore, LedgerService) {
    seeded(InMemoryLedgerStore::new().with_latency(latency), accounts)
}

fn seeded(
    store: InMemoryLedgerStore,
    accounts: &[(AccountId, Decimal)],
) -> (InMemoryLedgerStore, LedgerService) {
    for (id, balance) in accounts {
        store.insert_account(*id, *balance);
    }
    let service = LedgerService::new(Arc::new(store.clone()));
    (store, service)
}

/// Connects to `DATABASE_URL` and applies migrations. Returns `None` when the
/// variable is unset so Postgres-backed tests can skip.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set; skipping Postgres test");
            return None;
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    Some(pool)
}
