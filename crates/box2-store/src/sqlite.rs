//! SQLite implementation of the KeyStorage trait.
//!
//! The primary storage backend. It uses rusqlite with bundled SQLite,
//! wrapped in async via tokio::spawn_blocking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection};

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{KeyRecord, KeyStorage};

/// SQLite-based storage implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime. The connection is dropped on
/// [`KeyStorage::close`].
pub struct SqliteStorage {
    conn: Arc<Mutex<Option<Connection>>>,
}

impl SqliteStorage {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            let conn = guard.as_ref().ok_or(StoreError::Closed)?;
            f(conn)
        })
        .await?
    }
}

#[async_trait]
impl KeyStorage for SqliteStorage {
    async fn load_all(&self) -> Result<Vec<KeyRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT body FROM key_records ORDER BY rowid")?;
            let bodies = stmt
                .query_map([], |row| row.get::<_, Vec<u8>>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            bodies
                .iter()
                .map(|body| KeyRecord::from_cbor(body))
                .collect()
        })
        .await
    }

    async fn put(&self, record: &KeyRecord) -> Result<()> {
        let kind = record.kind().as_str();
        let id = record.id();
        let body = record.to_cbor()?;

        self.with_conn(move |conn| {
            // re-inserting gives the row a fresh rowid, so loads replay in write order
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM key_records WHERE kind = ?1 AND id = ?2",
                params![kind, id],
            )?;
            tx.execute(
                "INSERT INTO key_records (kind, id, body, updated_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![kind, id, body, now_millis()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Poisoned(e.to_string()))?;
            if let Some(conn) = guard.take() {
                conn.close().map_err(|(_, e)| StoreError::Database(e))?;
            }
            Ok(())
        })
        .await?
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
