use std::sync::Mutex;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::{matches_params, Adapter, StorageAdapter};
use crate::error::{AdapterError, Result};

/// Create the storage tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS memory (
            id          INTEGER PRIMARY KEY CHECK (id = 1),
            data        TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS documents (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            collection  TEXT NOT NULL,
            data        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_collection
            ON documents(collection);",
    )
}

/// SQLite-backed storage. Documents are stored as JSON text per collection;
/// query params are applied after loading a collection's rows.
///
/// Thread-safe: the connection sits behind a `Mutex`.
pub struct SqliteStorage {
    db: Mutex<Connection>,
}

impl SqliteStorage {
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn open(path: &str) -> Result<Self> {
        info!(path, "opening sqlite storage");
        Self::new(Connection::open(path)?)
    }

    pub fn in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn rows(&self, collection: &str) -> Result<Vec<(i64, Value)>> {
        let db = self.db.lock().expect("sqlite storage poisoned");
        let mut stmt =
            db.prepare("SELECT id, data FROM documents WHERE collection = ?1 ORDER BY id")?;
        let raw = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        raw.into_iter()
            .map(|(id, data)| -> Result<(i64, Value)> { Ok((id, serde_json::from_str(&data)?)) })
            .collect()
    }
}

#[async_trait]
impl Adapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn save_memory(&self, data: &Value) -> Result<()> {
        let db = self.db.lock().expect("sqlite storage poisoned");
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO memory (id, data, updated_at) VALUES (1, ?1, ?2)
             ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![serde_json::to_string(data)?, now],
        )?;
        debug!("memory saved");
        Ok(())
    }

    async fn load_memory(&self) -> Result<Option<Value>> {
        let db = self.db.lock().expect("sqlite storage poisoned");
        let raw: Option<String> = db
            .query_row("SELECT data FROM memory WHERE id = 1", [], |row| row.get(0))
            .optional()?;
        raw.map(|data| serde_json::from_str(&data).map_err(AdapterError::from))
            .transpose()
    }

    async fn keep(&self, collection: &str, data: &Value) -> Result<()> {
        let db = self.db.lock().expect("sqlite storage poisoned");
        let now = chrono::Utc::now().to_rfc3339();
        db.execute(
            "INSERT INTO documents (collection, data, created_at) VALUES (?1, ?2, ?3)",
            params![collection, serde_json::to_string(data)?, now],
        )?;
        debug!(collection, "document kept");
        Ok(())
    }

    async fn find(&self, collection: &str, params: &Value) -> Result<Vec<Value>> {
        Ok(self
            .rows(collection)?
            .into_iter()
            .filter(|(_, doc)| matches_params(doc, params))
            .map(|(_, doc)| doc)
            .collect())
    }

    async fn lose(&self, collection: &str, params: &Value) -> Result<usize> {
        let ids: Vec<i64> = self
            .rows(collection)?
            .into_iter()
            .filter(|(_, doc)| matches_params(doc, params))
            .map(|(id, _)| id)
            .collect();
        let db = self.db.lock().expect("sqlite storage poisoned");
        for id in &ids {
            db.execute("DELETE FROM documents WHERE id = ?1", params![id])?;
        }
        Ok(ids.len())
    }
}
