//! SQLite backend.

use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use tracing::{debug, info};

use super::{unix_now, HandlerOptions, StorageHandler};
use crate::error::SessionError;
use crate::Result;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS session_vault (
    id TEXT PRIMARY KEY NOT NULL,
    data BLOB NOT NULL,
    updated_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_session_vault_updated ON session_vault(updated_at);";

/// How long a statement waits on another connection's lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Stores records in a `session_vault` table.
///
/// The connection is opened lazily on first use and dropped by `close()`.
/// Without a configured path the database lives in memory and disappears
/// with the connection.
pub struct DatabaseHandler {
    conn: Mutex<Option<Connection>>,
    path: Mutex<Option<PathBuf>>,
    options: HandlerOptions,
}

impl DatabaseHandler {
    /// Create a handler for the database at `options.path`.
    pub fn new(options: HandlerOptions) -> Self {
        Self {
            conn: Mutex::new(None),
            path: Mutex::new(options.path.clone()),
            options,
        }
    }

    fn connect(&self) -> Result<Connection> {
        let path = self
            .path
            .lock()
            .map_err(|_| SessionError::LockPoisoned)?
            .clone();

        let conn = match &path {
            Some(p) => Connection::open(p)?,
            None => Connection::open_in_memory()?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;

        info!(
            backend = "database",
            path = %path.as_deref().map(|p| p.display().to_string()).unwrap_or_else(|| ":memory:".into()),
            "connected"
        );
        Ok(conn)
    }

    fn with_conn<T>(
        &self,
        id: &str,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut guard = self.conn.lock().map_err(|_| SessionError::LockPoisoned)?;
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard
            .as_ref()
            .ok_or_else(|| SessionError::BackendFailure("no database connection".into()))?;
        f(conn).map_err(|e| map_db_error(id, e))
    }
}

/// SQLite integers are signed; far-future timestamps clamp to the maximum.
fn sql_secs(secs: u64) -> i64 {
    i64::try_from(secs).unwrap_or(i64::MAX)
}

/// Busy and locked databases mean another writer holds the record.
fn map_db_error(id: &str, e: rusqlite::Error) -> SessionError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked) => {
            SessionError::Locked(id.to_string())
        }
        _ => SessionError::BackendFailure(e.to_string()),
    }
}

impl StorageHandler for DatabaseHandler {
    fn is_supported() -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "database"
    }

    fn open(&self, save_path: &str, _session_name: &str) -> Result<()> {
        if !save_path.is_empty() {
            let conn = self.conn.lock().map_err(|_| SessionError::LockPoisoned)?;
            let mut path = self.path.lock().map_err(|_| SessionError::LockPoisoned)?;
            // An open connection keeps its database.
            if conn.is_none() && path.is_none() {
                *path = Some(PathBuf::from(save_path));
            }
        }
        self.with_conn("", |_| Ok(()))
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.conn.lock().map_err(|_| SessionError::LockPoisoned)?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| SessionError::from(e))?;
        }
        Ok(())
    }

    fn read(&self, id: &str) -> Result<Vec<u8>> {
        let key = self.options.key(id);
        let data = self.with_conn(id, |conn| {
            conn.query_row(
                "SELECT data FROM session_vault WHERE id = ?1 AND expires_at > ?2",
                params![key, sql_secs(unix_now())],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })?;
        Ok(data.unwrap_or_default())
    }

    fn write(&self, id: &str, data: &[u8]) -> Result<()> {
        let key = self.options.key(id);
        let now = sql_secs(unix_now());
        let expires_at = sql_secs(self.options.expires_at());

        self.with_conn(id, |conn| {
            conn.execute(
                "INSERT INTO session_vault (id, data, updated_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO UPDATE SET
                    data = excluded.data,
                    updated_at = excluded.updated_at,
                    expires_at = excluded.expires_at",
                params![key, data, now, expires_at],
            )
        })?;

        debug!(backend = "database", id, len = data.len(), "record written");
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<()> {
        let key = self.options.key(id);
        self.with_conn(id, |conn| {
            conn.execute("DELETE FROM session_vault WHERE id = ?1", params![key])
        })?;
        Ok(())
    }

    fn gc(&self, max_lifetime: u64) -> Result<usize> {
        let now = unix_now();
        let cutoff = sql_secs(now.saturating_sub(max_lifetime));
        let prefix = format!("{}%", self.options.prefix);

        self.with_conn("", |conn| {
            conn.execute(
                "DELETE FROM session_vault
                 WHERE id LIKE ?1 AND (updated_at < ?2 OR expires_at <= ?3)",
                params![prefix, cutoff, sql_secs(now)],
            )
        })
    }
}

impl std::fmt::Debug for DatabaseHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandler")
            .field("path", &self.path.lock().ok().and_then(|p| p.clone()))
            .field("options", &self.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn in_memory() -> DatabaseHandler {
        DatabaseHandler::new(HandlerOptions::new("db_", 1000))
    }

    #[test]
    fn test_read_unknown_is_empty() {
        let handler = in_memory();
        assert!(handler.read("missing").unwrap().is_empty());
    }

    #[test]
    fn test_write_then_read() {
        let handler = in_memory();
        handler.write("abc", b"payload").unwrap();
        assert_eq!(handler.read("abc").unwrap(), b"payload");

        handler.write("abc", b"updated").unwrap();
        assert_eq!(handler.read("abc").unwrap(), b"updated");
    }

    #[test]
    fn test_write_sets_expiry() {
        let handler = in_memory();
        handler.write("abc", b"payload").unwrap();

        let expires: i64 = handler
            .with_conn("abc", |conn| {
                conn.query_row(
                    "SELECT expires_at FROM session_vault WHERE id = 'db_abc'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();
        assert!((expires as u64).abs_diff(unix_now() + 1000) <= 2);
    }

    #[test]
    fn test_destroy_idempotent() {
        let handler = in_memory();
        handler.write("abc", b"payload").unwrap();
        assert!(handler.destroy("abc").is_ok());
        assert!(handler.destroy("abc").is_ok());
        assert!(handler.read("abc").unwrap().is_empty());
    }

    #[test]
    fn test_gc_removes_expired_rows() {
        let handler = DatabaseHandler::new(HandlerOptions::new("db_", 0));
        handler.write("a", b"1").unwrap();
        handler.write("b", b"2").unwrap();
        assert!(handler.read("a").unwrap().is_empty());
        assert_eq!(handler.gc(3600).unwrap(), 2);
    }

    #[test]
    fn test_far_future_ttl_stays_readable() {
        let handler = DatabaseHandler::new(HandlerOptions::new("db_", u64::MAX));
        handler.write("abc", b"payload").unwrap();
        assert_eq!(handler.read("abc").unwrap(), b"payload");
        assert_eq!(handler.gc(60).unwrap(), 0);
        assert_eq!(sql_secs(u64::MAX), i64::MAX);
    }

    #[test]
    fn test_gc_keeps_fresh_rows() {
        let handler = in_memory();
        handler.write("a", b"1").unwrap();
        assert_eq!(handler.gc(60).unwrap(), 0);
        assert_eq!(handler.read("a").unwrap(), b"1");
    }

    #[test]
    fn test_persists_across_close() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("sessions.db");
        let handler = DatabaseHandler::new(HandlerOptions::new("db_", 1000));

        handler.open(db.to_str().unwrap(), "SID").unwrap();
        handler.write("abc", b"kept").unwrap();
        handler.close().unwrap();
        handler.close().unwrap();

        let reopened = DatabaseHandler::new(HandlerOptions::new("db_", 1000).with_path(&db));
        assert_eq!(reopened.read("abc").unwrap(), b"kept");
    }
}
