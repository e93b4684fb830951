use rust_decimal::Decimal;
use serde::Deserialize;

use crate::error::{LedgerError, Result};
use crate::models::AccountId;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub application: ApplicationSettings,
    pub ledger: LedgerSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
    pub acquire_timeout_secs: u64,
    pub run_migrations: bool,
}

/// Which [`LedgerStore`](crate::repositories::LedgerStore) backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationSettings {
    pub host: String,
    pub port: u16,
    pub storage: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LedgerSettings {
    /// Page size of the history endpoint when the client gives none.
    pub default_history_limit: i64,
    pub max_history_limit: i64,
    /// Accounts created at startup by the memory backend.
    #[serde(default)]
    pub seed_accounts: Vec<SeedAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeedAccount {
    pub id: AccountId,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
    pub format: String,
}

impl Settings {
    /// Loads `config/default`, then `config/local`, then `APP__*` environment
    /// variables. A `.env` file, if present, is loaded into the environment
    /// first.
    pub fn new() -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let ledger = &self.ledger;
        if ledger.max_history_limit < 1 {
            return Err(LedgerError::Validation(
                "ledger.max_history_limit must be at least 1".to_string(),
            ));
        }
        if ledger.default_history_limit < 1 || ledger.default_history_limit > ledger.max_history_limit {
            return Err(LedgerError::Validation(format!(
                "ledger.default_history_limit must be between 1 and {}",
                ledger.max_history_limit
            )));
        }
        if self.database.pool_size == 0 {
            return Err(LedgerError::Validation(
                "database.pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
