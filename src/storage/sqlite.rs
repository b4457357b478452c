//! SQLite ledger backend
//!
//! One row per published (event, stage). The primary key makes recording a
//! publication an atomic insert-if-absent at the storage layer.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};

use crate::models::{EventId, Stage};
use crate::storage::ledger::{LedgerStore, StageFlags};
use crate::utils::error::LedgerError;

/// Ledger stored in an SQLite database
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedgerStore {
    /// Open (or create) a ledger database
    pub fn new(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| LedgerError::io("create ledger directory", e))?;
        }

        let conn = Connection::open(path)?;

        // FULL so a recorded publication survives power loss
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_schema()?;
        Ok(store)
    }

    /// Create an in-memory ledger (for testing)
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> Result<(), LedgerError> {
        let conn = lock(&self.conn)?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS stage_publications (
                event_id INTEGER NOT NULL,
                stage TEXT NOT NULL,
                published_at TEXT NOT NULL,
                PRIMARY KEY (event_id, stage)
            );
            "#,
        )?;
        Ok(())
    }

    /// Run a blocking closure against the connection off the async runtime
    async fn with_conn<T, F>(&self, f: F) -> Result<T, LedgerError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, LedgerError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = lock(&conn)?;
            f(&conn)
        })
        .await
        .map_err(|e| LedgerError::Task(e.to_string()))?
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
    conn.lock()
        .map_err(|_| LedgerError::Task("sqlite connection lock poisoned".to_string()))
}

fn db_id(event_id: EventId) -> Result<i64, LedgerError> {
    i64::try_from(event_id.0)
        .map_err(|_| LedgerError::Corrupted(format!("event id {event_id} out of range")))
}

fn insert_stage(conn: &Connection, id: i64, stage: Stage) -> Result<bool, LedgerError> {
    let changed = conn.execute(
        "INSERT INTO stage_publications (event_id, stage, published_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(event_id, stage) DO NOTHING",
        params![id, stage.as_str(), Utc::now().to_rfc3339()],
    )?;
    Ok(changed == 1)
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    async fn get(&self, event_id: EventId) -> Result<StageFlags, LedgerError> {
        let id = db_id(event_id)?;
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT stage FROM stage_publications WHERE event_id = ?1")?;
            let stages = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            let mut flags = StageFlags::default();
            for raw in stages {
                match Stage::parse(&raw) {
                    Some(stage) => {
                        flags.set(stage);
                    }
                    None => {
                        return Err(LedgerError::Corrupted(format!(
                            "unknown stage '{raw}' for event {id}"
                        )))
                    }
                }
            }
            Ok(flags)
        })
        .await
    }

    async fn put(&self, event_id: EventId, flags: StageFlags) -> Result<(), LedgerError> {
        let id = db_id(event_id)?;
        self.with_conn(move |conn| {
            for stage in flags.published_stages() {
                insert_stage(conn, id, stage)?;
            }
            Ok(())
        })
        .await
    }

    async fn mark(&self, event_id: EventId, stage: Stage) -> Result<bool, LedgerError> {
        let id = db_id(event_id)?;
        self.with_conn(move |conn| insert_stage(conn, id, stage)).await
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}
