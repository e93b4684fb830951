use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use wallet_ledger::api::{create_router, AppState};
use wallet_ledger::config::{Settings, StorageBackend};
use wallet_ledger::observability::{init_logging, init_metrics, LogConfig};
use wallet_ledger::repositories::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};
use wallet_ledger::services::LedgerService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let settings = Settings::new()?;

    init_logging(&LogConfig::from(&settings.logging))?;
    let metrics_handle = init_metrics()?;
    info!("Configuration loaded");

    let store = build_store(&settings).await?;

    let service = LedgerService::new(store)
        .with_max_history_limit(settings.ledger.max_history_limit);
    let state = AppState::new(service, settings.ledger.default_history_limit)
        .with_metrics(metrics_handle);
    let app = create_router(state);

    let addr = format!("{}:{}", settings.application.host, settings.application.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn build_store(settings: &Settings) -> Result<Arc<dyn LedgerStore>, Box<dyn std::error::Error>> {
    match settings.application.storage {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(settings.database.pool_size)
                .acquire_timeout(Duration::from_secs(settings.database.acquire_timeout_secs))
                .connect(&settings.database.url)
                .await?;
            info!("Database connection established");

            if settings.database.run_migrations {
                info!("Running database migrations...");
                sqlx::migrate!("./migrations").run(&pool).await?;
                info!("Migrations applied successfully");
            }

            Ok(Arc::new(PgLedgerStore::new(pool)))
        }
        StorageBackend::Memory => {
            let store = InMemoryLedgerStore::new();
            for seed in &settings.ledger.seed_accounts {
                store.insert_account(seed.id, seed.balance);
            }
            info!(
                accounts = settings.ledger.seed_accounts.len(),
                "Using in-memory ledger store"
            );
            Ok(Arc::new(store))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
