use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::task;

/// Durable keyed records. Each key holds one serialized value, replaced
/// wholesale on write.
#[derive(Debug, Clone)]
pub struct Storage {
    conn: Arc<Mutex<Connection>>,
}

impl Storage {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open storage at {}", path.display()))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let storage = Storage {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.run_migrations()?;

        Ok(storage)
    }

    /// Create an in-memory storage (used for testing and ephemeral sessions)
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let storage = Storage {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.run_migrations()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("Storage connection lock poisoned"))
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER NOT NULL
            );",
        )?;

        let version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE records (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                INSERT INTO schema_version (version) VALUES (1);",
            )?;
        }

        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row(
                "SELECT value FROM records WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read record '{}'", key))?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )
        .with_context(|| format!("Failed to write record '{}'", key))?;
        Ok(())
    }

    /// [`Storage::get`] on the blocking pool, for use from async code.
    pub async fn get_record(&self, key: &str) -> Result<Option<String>> {
        let storage = self.clone();
        let key = key.to_string();
        task::spawn_blocking(move || storage.get(&key)).await?
    }

    /// [`Storage::set`] on the blocking pool, for use from async code.
    pub async fn set_record(&self, key: &str, value: &str) -> Result<()> {
        let storage = self.clone();
        let key = key.to_string();
        let value = value.to_string();
        task::spawn_blocking(move || storage.set(&key, &value)).await?
    }
}
