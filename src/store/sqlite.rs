//! SQLite-backed lock store.

use super::{LockRecord, LockStore, StoreError};
use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS lock_records (
    resource   TEXT PRIMARY KEY NOT NULL,
    locked     INTEGER NOT NULL DEFAULT 0,
    owner      TEXT NOT NULL DEFAULT '',
    granted_at TEXT
);
";

/// Lock store keeping one row per resource in a SQLite database.
///
/// Each conditional write is a single guarded `UPDATE`; SQLite serializes
/// writers, so the changed-row count tells exactly one racing process that
/// it won.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and ensure the table exists.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let open_error = |message: String| StoreError::Open {
            path: path.to_path_buf(),
            message,
        };

        let conn = Connection::open(path).map_err(|e| open_error(e.to_string()))?;
        conn.busy_timeout(busy_timeout)
            .map_err(|e| open_error(format!("failed to set busy timeout: {}", e)))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
            row.get::<_, String>(0)
        })
        .map_err(|e| open_error(format!("failed to enable WAL: {}", e)))?;

        Self::from_connection(conn).map_err(|e| open_error(e.to_string()))
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Open {
            path: ":memory:".into(),
            message: e.to_string(),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| StoreError::Write(format!("failed to create lock table: {}", e)))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create the unlocked row for `resource` if it does not exist yet.
    /// Returns whether a row was created.
    pub fn bootstrap(&self, resource: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn()
            .execute(
                "INSERT OR IGNORE INTO lock_records (resource, locked, owner, granted_at)
                 VALUES (?1, 0, '', NULL)",
                params![resource],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(changed == 1)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

/// Format SQLite's own `CURRENT_TIMESTAMP` and `datetime()` produce, in UTC.
const SQLITE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Interpret a stored grant time. `granted_at` is informational, so a value
/// in neither RFC 3339 nor SQLite's format is logged and read as absent.
fn parse_granted_at(resource: &str, raw: Option<String>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(t) = NaiveDateTime::parse_from_str(value, SQLITE_TIMESTAMP) {
        return Some(t.and_utc());
    }
    tracing::warn!(resource, granted_at = value, "ignoring unrecognized grant time");
    None
}

impl LockStore for SqliteStore {
    fn read(&self, resource: &str) -> Result<LockRecord, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT locked, owner, granted_at FROM lock_records WHERE resource = ?1",
                params![resource],
                |row| {
                    Ok((
                        row.get::<_, bool>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| StoreError::Query(e.to_string()))?;

        let Some((locked, owner, granted_at)) = row else {
            return Err(StoreError::MissingRecord(resource.to_string()));
        };

        Ok(LockRecord {
            locked,
            owner: owner.unwrap_or_default(),
            granted_at: parse_granted_at(resource, granted_at),
        })
    }

    fn conditional_write(
        &self,
        resource: &str,
        expected: &LockRecord,
        new: &LockRecord,
    ) -> Result<bool, StoreError> {
        let granted_at = new.granted_at.map(|t| t.to_rfc3339());
        let changed = self
            .conn()
            .execute(
                "UPDATE lock_records
                 SET locked = ?1, owner = ?2, granted_at = ?3
                 WHERE resource = ?4 AND locked = ?5 AND COALESCE(owner, '') = ?6",
                params![
                    new.locked,
                    new.owner,
                    granted_at,
                    resource,
                    expected.locked,
                    expected.owner
                ],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
        Ok(changed == 1)
    }

    fn force_clear(&self, resource: &str) -> Result<(), StoreError> {
        let changed = self
            .conn()
            .execute(
                "UPDATE lock_records SET locked = 0, owner = '', granted_at = NULL
                 WHERE resource = ?1",
                params![resource],
            )
            .map_err(|e| StoreError::Write(e.to_string()))?;
        if changed == 0 {
            return Err(StoreError::MissingRecord(resource.to_string()));
        }
        Ok(())
    }
}
