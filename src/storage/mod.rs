//! Persistence for publication state and the tracked event
//!
//! - [`ledger`] - `LedgerStore` trait, `IdempotencyLedger` and the in-memory store
//! - [`file`] - JSON file backend (atomic temp file + rename)
//! - [`sqlite`] - SQLite backend
//! - [`redis`] - Redis backend shared between processes
//! - [`refresh`] - on-disk cache of the tracked event

pub mod file;
pub mod ledger;
pub mod redis;
pub mod refresh;
pub mod sqlite;

use std::sync::Arc;

use crate::config::{LedgerBackend, LedgerConfig};
use crate::utils::error::LedgerError;

pub use file::FileLedgerStore;
pub use ledger::{IdempotencyLedger, LedgerClaim, LedgerStore, MemoryLedgerStore, StageFlags};
pub use refresh::{CachedEvent, EventCache};
pub use sqlite::SqliteLedgerStore;

pub use self::redis::RedisLedgerStore;

/// Build the ledger store selected by configuration
pub async fn open_ledger_store(config: &LedgerConfig) -> Result<Arc<dyn LedgerStore>, LedgerError> {
    let store: Arc<dyn LedgerStore> = match config.backend {
        LedgerBackend::Memory => Arc::new(MemoryLedgerStore::new()),
        LedgerBackend::File => Arc::new(FileLedgerStore::new(&config.path)),
        LedgerBackend::Sqlite => Arc::new(SqliteLedgerStore::new(&config.path)?),
        LedgerBackend::Redis => {
            Arc::new(RedisLedgerStore::connect(&config.redis_url, config.key_prefix.clone()).await?)
        }
    };

    tracing::info!(backend = store.backend_name(), "Ledger store opened");
    Ok(store)
}
