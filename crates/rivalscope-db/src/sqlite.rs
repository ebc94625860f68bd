use std::path::Path;

use async_trait::async_trait;
use rivalscope_common::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};
use tokio::sync::Mutex;
use tracing::info;

use crate::backend::RemoteBackend;

/// History table kept in a SQLite file, for deployments without Supabase.
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening history database at {}", db_path.display());
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS chat_memory (
                session_id TEXT PRIMARY KEY,
                messages TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );",
        )
        .map_err(|e| Error::Database(format!("migration failed: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl RemoteBackend for SqliteBackend {
    fn backend_id(&self) -> &str {
        "sqlite"
    }

    async fn probe(&self) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT COUNT(*) FROM chat_memory", [], |row| {
            row.get::<_, i64>(0)
        })
        .map_err(|e| Error::Database(format!("probe failed: {e}")))?;
        Ok(())
    }

    async fn select(&self, session_id: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT messages FROM chat_memory WHERE session_id = ?1",
            params![session_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map_err(|e| Error::Database(format!("failed to load history: {e}")))
    }

    async fn upsert(&self, session_id: &str, serialized_log: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO chat_memory (session_id, messages, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(session_id) DO UPDATE SET
               messages = excluded.messages,
               updated_at = excluded.updated_at",
            params![session_id, serialized_log, chrono::Utc::now().to_rfc3339()],
        )
        .map_err(|e| Error::Database(format!("failed to store history: {e}")))?;
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM chat_memory WHERE session_id = ?1",
            params![session_id],
        )
        .map_err(|e| Error::Database(format!("failed to delete history: {e}")))?;
        Ok(())
    }
}
