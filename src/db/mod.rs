pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default SQLite busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Handle to the soundbase database.
///
/// Holds no open connection. Every call to [`Store::with_conn`] or
/// [`Store::with_tx`] opens a fresh connection and releases it before
/// returning, so the bot, scheduled jobs and the dashboard can share the
/// same file across processes. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    busy_timeout: Duration,
}

/// Operator-facing database diagnostics.
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub integrity_ok: bool,
    pub integrity_details: String,
    pub schema_version: u32,
    pub sound_count: u64,
    pub action_count: u64,
    pub voice_session_count: u64,
    pub open_voice_sessions: u64,
    pub list_count: u64,
    pub keyword_count: u64,
}

impl Store {
    /// Open (or create) the database at `path` with the default busy timeout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    /// Open (or create) the database, initialize the schema and run migrations.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create directory {}", parent.display()))?;
            }
        }

        let store = Self {
            inner: Arc::new(StoreInner {
                path: path.to_path_buf(),
                busy_timeout: Duration::from_millis(busy_timeout_ms),
            }),
        };

        let mut conn = store.connect()?;
        // WAL lets readers proceed while a writer holds the lock
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::init_schema(&conn).context("failed to initialize schema")?;
        migrations::run_migrations(&mut conn).context("failed to run migrations")?;

        tracing::info!(path = %path.display(), "database initialized");
        Ok(store)
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Open a new connection with the per-connection pragmas applied.
    pub fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.inner.path).with_context(|| {
            format!("failed to open database at {}", self.inner.path.display())
        })?;
        conn.busy_timeout(self.inner.busy_timeout)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    /// Run `f` against a fresh connection. The connection is closed on return.
    pub fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.connect()?;
        f(&conn)
    }

    /// Run `f` inside an `IMMEDIATE` transaction on a fresh connection.
    ///
    /// The write lock is taken up front, so read-then-write sequences inside
    /// `f` cannot interleave with another writer. Commits when `f` returns
    /// `Ok`, rolls back otherwise.
    pub fn with_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut conn = self.connect()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Run integrity and row-count diagnostics.
    pub fn health(&self) -> Result<HealthReport> {
        self.with_conn(check_database_health)
    }
}

/// Run integrity and row-count diagnostics against an open connection.
pub fn check_database_health(conn: &Connection) -> Result<HealthReport> {
    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    let schema_version = migrations::get_schema_version(conn)?;

    let count = |sql: &str| -> Result<u64> {
        let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n as u64)
    };

    Ok(HealthReport {
        integrity_ok: integrity == "ok",
        integrity_details: integrity,
        schema_version,
        sound_count: count("SELECT COUNT(*) FROM sounds")?,
        action_count: count("SELECT COUNT(*) FROM actions")?,
        voice_session_count: count("SELECT COUNT(*) FROM voice_activity")?,
        open_voice_sessions: count("SELECT COUNT(*) FROM voice_activity WHERE leave_time IS NULL")?,
        list_count: count("SELECT COUNT(*) FROM sound_lists")?,
        keyword_count: count("SELECT COUNT(*) FROM keywords")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn open_creates_file_and_reports_current_version() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("nested").join("bot.db")).unwrap();
        assert!(store.path().exists());

        let report = store.health().unwrap();
        assert!(report.integrity_ok);
        assert_eq!(report.schema_version, migrations::CURRENT_SCHEMA_VERSION);
        assert_eq!(report.sound_count, 0);
    }

    #[test]
    fn each_connection_gets_busy_timeout_and_foreign_keys() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open_with_timeout(tmp.path().join("bot.db"), 1234).unwrap();
        let conn = store.connect().unwrap();

        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 1234);

        let fk: i64 = conn
            .pragma_query_value(None, "foreign_keys", |row| row.get(0))
            .unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let tmp = TempDir::new().unwrap();
        let store = Store::open(tmp.path().join("bot.db")).unwrap();

        let result: Result<()> = store.with_tx(|tx| {
            tx.execute(
                "INSERT INTO keywords (keyword, action_type, action_value) VALUES ('hi', 'play', 'x')",
                [],
            )?;
            anyhow::bail!("abort")
        });
        assert!(result.is_err());

        let count: i64 = store
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM keywords", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
    }
}
