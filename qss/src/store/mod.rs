//! Database store for QSS
//!
//! The store manages the SQLite database containing:
//! - Suggestions (one row per scope and term, with frequency and approval)
//! - Analytics (one row per executed search)
//! - Archives and archived analytics (compacted past analytics)

pub(crate) mod queries;
mod schema;

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

pub use queries::format_timestamp;
pub use schema::SCHEMA_VERSION;

/// How long a writer waits on a lock held by another connection
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A suggestion term observed in (or added to) a search scope
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Suggestion {
    pub id: i64,
    pub scope: String,
    pub term: String,
    pub frequency: i64,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One executed search query
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AnalyticRecord {
    pub id: i64,
    pub scope: String,
    pub query: String,
    pub result_count: i64,
    pub searched_at: DateTime<Utc>,
}

/// One archival batch for a scope
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArchiveBatch {
    pub id: i64,
    pub scope: String,
    /// UTC day the batch collects archival runs for
    pub archive_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    /// Number of archived records the batch owns
    pub record_count: i64,
}

/// Compacted copy of an analytic record owned by an archive batch
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ArchivedRecord {
    pub id: i64,
    pub archive_id: i64,
    /// Id the record had in the analytics table
    pub source_id: i64,
    pub scope: String,
    pub query: String,
    pub result_count: i64,
    pub searched_at: DateTime<Utc>,
}

/// The main database store
///
/// The connection sits behind a mutex so one store can serve concurrent
/// request threads; compound writes take an immediate (write-locking)
/// transaction so separate processes sharing the file serialize too.
pub struct Store {
    conn: Mutex<Connection>,
    path: PathBuf,
}

impl Store {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        // Enable WAL mode for better concurrent access
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("Opened {} (journal_mode={})", path.display(), mode);
        conn.pragma_update(None, "foreign_keys", true)?;

        let store = Store {
            conn: Mutex::new(conn),
            path,
        };
        store.ensure_schema()?;

        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", true)?;
        let store = Store {
            conn: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Ensure the database schema is up to date
    fn ensure_schema(&self) -> Result<()> {
        self.write(|tx| schema::ensure_schema(tx))
    }

    /// Get the database path
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Other("Store connection lock poisoned".to_string()))
    }

    /// Run read-only work against the connection
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run work inside an immediate transaction.
    ///
    /// Commits when `f` returns `Ok`; any error rolls every change back.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    // -------------------------------------------------------------------------
    // Suggestion lookups
    // -------------------------------------------------------------------------

    /// Get a suggestion by id
    pub fn get_suggestion(&self, id: i64) -> Result<Suggestion> {
        self.read(|conn| queries::get_suggestion(conn, id))
    }

    /// Find a suggestion by scope and term
    pub fn find_suggestion(&self, scope: &str, term: &str) -> Result<Option<Suggestion>> {
        self.read(|conn| queries::find_suggestion(conn, scope, term))
    }

    /// Count suggestions, optionally within one scope
    pub fn count_suggestions(&self, scope: Option<&str>) -> Result<i64> {
        self.read(|conn| queries::count_suggestions(conn, scope))
    }

    // -------------------------------------------------------------------------
    // Analytics
    // -------------------------------------------------------------------------

    /// Log an executed search without touching suggestions
    pub fn log_analytic(
        &self,
        scope: &str,
        query: &str,
        result_count: i64,
        at: DateTime<Utc>,
    ) -> Result<AnalyticRecord> {
        self.write(|tx| queries::insert_analytic(tx, scope, query, result_count, &at))
    }

    /// Live analytics for a scope, oldest first
    pub fn list_analytics(&self, scope: &str) -> Result<Vec<AnalyticRecord>> {
        self.read(|conn| queries::list_analytics(conn, scope))
    }

    /// Count live analytics, optionally within one scope
    pub fn count_analytics(&self, scope: Option<&str>) -> Result<i64> {
        self.read(|conn| queries::count_analytics(conn, scope))
    }

    /// Every scope with suggestions, analytics, or archives
    pub fn list_scopes(&self) -> Result<Vec<String>> {
        self.read(queries::list_scopes)
    }

    // -------------------------------------------------------------------------
    // Archives
    // -------------------------------------------------------------------------

    /// Get an archive batch by id
    pub fn get_archive(&self, id: i64) -> Result<ArchiveBatch> {
        self.read(|conn| queries::get_archive(conn, id))
    }

    /// List archive batches, optionally within one scope
    pub fn list_archives(&self, scope: Option<&str>) -> Result<Vec<ArchiveBatch>> {
        self.read(|conn| queries::list_archives(conn, scope))
    }

    /// Records owned by an archive batch
    pub fn list_archived(&self, archive_id: i64) -> Result<Vec<ArchivedRecord>> {
        self.read(|conn| queries::list_archived(conn, archive_id))
    }

    /// Count archived records, optionally within one scope
    pub fn count_archived(&self, scope: Option<&str>) -> Result<i64> {
        self.read(|conn| queries::count_archived(conn, scope))
    }

    /// Get database file size in bytes
    pub fn database_size(&self) -> Result<u64> {
        if self.path.to_str() == Some(":memory:") {
            return Ok(0);
        }
        let metadata = std::fs::metadata(&self.path)?;
        Ok(metadata.len())
    }
}
