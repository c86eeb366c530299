pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::{Result, anyhow};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::info;

/// How long a statement waits on a lock held by another process before
/// failing with `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// The comment store. A single SQLite connection shared behind a mutex;
/// callers run queries off the async runtime.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the comment file at `path` and bring its schema up
    /// to date.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so list requests are not blocked behind a write
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::prepare(conn)?;

        info!("Comment store opened at {} (schema v{})", path.display(), db.schema_version()?);
        Ok(db)
    }

    /// A throwaway store that lives as long as the returned value.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?)
    }

    fn prepare(conn: Connection) -> Result<Self> {
        // Replies rely on ON DELETE SET NULL, which SQLite only honours with
        // foreign keys switched on per connection.
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<i64> {
        self.with_conn(migrations::current_version)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Comment store lock poisoned: {}", e))
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&*self.lock()?)
    }

    /// Like `with_conn`, but hands out a mutable connection so writes can
    /// open a transaction.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        f(&mut *self.lock()?)
    }
}
