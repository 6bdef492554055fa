use super::{Partition, StorageBackend, Versioned};
use crate::error::StoreError;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;

/// Durable backend over a single `kv` table. One connection behind a mutex;
/// WAL keeps readers from stalling the writer.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                partition TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                version INTEGER NOT NULL,
                PRIMARY KEY (partition, key)
            )",
            [],
        )?;

        info!("sqlite store ready at {}", path.as_ref().display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait::async_trait]
impl StorageBackend for SqliteBackend {
    async fn fetch(
        &self,
        partition: Partition,
        key: &str,
    ) -> Result<Versioned<Option<Value>>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare_cached("SELECT value, version FROM kv WHERE partition = ?1 AND key = ?2")?;
        let row = stmt
            .query_row(params![partition.as_str(), key], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })
            .optional()?;

        Ok(match row {
            Some((text, version)) => Versioned {
                // A row that no longer parses reads as absent, not as an error
                value: serde_json::from_str(&text).ok(),
                version: version as u64,
            },
            None => Versioned {
                value: None,
                version: 0,
            },
        })
    }

    async fn store(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let text = serde_json::to_string(&value)?;
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare_cached(
            "INSERT INTO kv (partition, key, value, version) VALUES (?1, ?2, ?3, 1)
             ON CONFLICT(partition, key)
             DO UPDATE SET value = excluded.value, version = kv.version + 1",
        )?;
        stmt.execute(params![partition.as_str(), key, text])?;
        Ok(())
    }

    async fn store_if(
        &self,
        partition: Partition,
        key: &str,
        value: Value,
        expected: u64,
    ) -> Result<bool, StoreError> {
        let text = serde_json::to_string(&value)?;
        let conn = self.conn.lock().unwrap();
        let changed = if expected == 0 {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO kv (partition, key, value, version) VALUES (?1, ?2, ?3, 1)
                 ON CONFLICT(partition, key) DO NOTHING",
            )?;
            stmt.execute(params![partition.as_str(), key, text])?
        } else {
            let mut stmt = conn.prepare_cached(
                "UPDATE kv SET value = ?3, version = version + 1
                 WHERE partition = ?1 AND key = ?2 AND version = ?4",
            )?;
            stmt.execute(params![partition.as_str(), key, text, expected as i64])?
        };
        Ok(changed == 1)
    }
}
