//! Row-level queries
//!
//! Plain functions over a `&Connection` so they compose inside a single
//! transaction (a `Transaction` derefs to `Connection`).

use super::{AnalyticRecord, ArchiveBatch, ArchivedRecord, Suggestion};
use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};

const SUGGESTION_COLUMNS: &str = "id, scope, term, frequency, approved, created_at, updated_at";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Fixed-width UTC timestamp, so text order matches time order
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(idx: usize, text: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parse_date(idx: usize, text: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&text, DATE_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn suggestion_from_row(row: &Row<'_>) -> rusqlite::Result<Suggestion> {
    Ok(Suggestion {
        id: row.get(0)?,
        scope: row.get(1)?,
        term: row.get(2)?,
        frequency: row.get(3)?,
        approved: row.get(4)?,
        created_at: parse_timestamp(5, row.get(5)?)?,
        updated_at: parse_timestamp(6, row.get(6)?)?,
    })
}

fn analytic_from_row(row: &Row<'_>) -> rusqlite::Result<AnalyticRecord> {
    Ok(AnalyticRecord {
        id: row.get(0)?,
        scope: row.get(1)?,
        query: row.get(2)?,
        result_count: row.get(3)?,
        searched_at: parse_timestamp(4, row.get(4)?)?,
    })
}

fn archive_from_row(row: &Row<'_>) -> rusqlite::Result<ArchiveBatch> {
    Ok(ArchiveBatch {
        id: row.get(0)?,
        scope: row.get(1)?,
        archive_date: parse_date(2, row.get(2)?)?,
        created_at: parse_timestamp(3, row.get(3)?)?,
        record_count: row.get(4)?,
    })
}

fn archived_from_row(row: &Row<'_>) -> rusqlite::Result<ArchivedRecord> {
    Ok(ArchivedRecord {
        id: row.get(0)?,
        archive_id: row.get(1)?,
        source_id: row.get(2)?,
        scope: row.get(3)?,
        query: row.get(4)?,
        result_count: row.get(5)?,
        searched_at: parse_timestamp(6, row.get(6)?)?,
    })
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

// -----------------------------------------------------------------------------
// Suggestions
// -----------------------------------------------------------------------------

/// Create the suggestion with frequency 1, or bump an existing one.
/// A single statement, so concurrent callers cannot lose updates.
pub fn increment_suggestion(
    conn: &Connection,
    scope: &str,
    term: &str,
    approved: bool,
    at: &DateTime<Utc>,
) -> Result<Suggestion> {
    let sql = format!(
        "INSERT INTO suggestions (scope, term, frequency, approved, created_at, updated_at)
         VALUES (?1, ?2, 1, ?3, ?4, ?4)
         ON CONFLICT(scope, term) DO UPDATE SET
           frequency = frequency + 1,
           updated_at = excluded.updated_at
         RETURNING {}",
        SUGGESTION_COLUMNS
    );
    let suggestion = conn.query_row(
        &sql,
        params![scope, term, approved, format_timestamp(at)],
        suggestion_from_row,
    )?;
    Ok(suggestion)
}

/// Insert a new suggestion, failing with `Duplicate` on an existing term
pub fn insert_suggestion(
    conn: &Connection,
    scope: &str,
    term: &str,
    frequency: i64,
    approved: bool,
    at: &DateTime<Utc>,
) -> Result<Suggestion> {
    let sql = format!(
        "INSERT INTO suggestions (scope, term, frequency, approved, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         RETURNING {}",
        SUGGESTION_COLUMNS
    );
    conn.query_row(
        &sql,
        params![scope, term, frequency, approved, format_timestamp(at)],
        suggestion_from_row,
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            Error::Duplicate {
                scope: scope.to_string(),
                term: term.to_string(),
            }
        } else {
            Error::Database(e)
        }
    })
}

pub fn find_suggestion(conn: &Connection, scope: &str, term: &str) -> Result<Option<Suggestion>> {
    let sql = format!(
        "SELECT {} FROM suggestions WHERE scope = ?1 AND term = ?2",
        SUGGESTION_COLUMNS
    );
    Ok(conn
        .query_row(&sql, params![scope, term], suggestion_from_row)
        .optional()?)
}

pub fn get_suggestion(conn: &Connection, id: i64) -> Result<Suggestion> {
    let sql = format!("SELECT {} FROM suggestions WHERE id = ?1", SUGGESTION_COLUMNS);
    conn.query_row(&sql, [id], suggestion_from_row)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("suggestion #{}", id)))
}

/// Whether a suggestion other than `excluding` already holds the term
pub fn term_taken(
    conn: &Connection,
    scope: &str,
    term: &str,
    excluding: Option<i64>,
) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM suggestions
         WHERE scope = ?1 AND term = ?2 AND (?3 IS NULL OR id != ?3)",
        params![scope, term, excluding],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn set_approved(
    conn: &Connection,
    scope: &str,
    term: &str,
    approved: bool,
    at: &DateTime<Utc>,
) -> Result<Option<Suggestion>> {
    let sql = format!(
        "UPDATE suggestions SET approved = ?3, updated_at = ?4
         WHERE scope = ?1 AND term = ?2
         RETURNING {}",
        SUGGESTION_COLUMNS
    );
    Ok(conn
        .query_row(
            &sql,
            params![scope, term, approved, format_timestamp(at)],
            suggestion_from_row,
        )
        .optional()?)
}

pub fn delete_suggestion(conn: &Connection, scope: &str, term: &str) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM suggestions WHERE scope = ?1 AND term = ?2",
        params![scope, term],
    )?;
    Ok(deleted > 0)
}

/// Suggestions for a scope, most frequent first, ties by term
pub fn list_suggestions(
    conn: &Connection,
    scope: &str,
    approved_only: bool,
) -> Result<Vec<Suggestion>> {
    let sql = format!(
        "SELECT {} FROM suggestions
         WHERE scope = ?1
           AND (?2 = 0 OR approved = 1)
         ORDER BY frequency DESC, term ASC",
        SUGGESTION_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let suggestions = stmt
        .query_map(params![scope, approved_only], suggestion_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(suggestions)
}

pub fn count_suggestions(conn: &Connection, scope: Option<&str>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM suggestions WHERE ?1 IS NULL OR scope = ?1",
        [scope],
        |row| row.get(0),
    )?;
    Ok(count)
}

// -----------------------------------------------------------------------------
// Analytics
// -----------------------------------------------------------------------------

pub fn insert_analytic(
    conn: &Connection,
    scope: &str,
    query: &str,
    result_count: i64,
    at: &DateTime<Utc>,
) -> Result<AnalyticRecord> {
    let record = conn.query_row(
        "INSERT INTO analytics (scope, query, result_count, searched_at)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING id, scope, query, result_count, searched_at",
        params![scope, query, result_count, format_timestamp(at)],
        analytic_from_row,
    )?;
    Ok(record)
}

pub fn list_analytics(conn: &Connection, scope: &str) -> Result<Vec<AnalyticRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, scope, query, result_count, searched_at
         FROM analytics WHERE scope = ?1 ORDER BY searched_at, id",
    )?;
    let records = stmt
        .query_map([scope], analytic_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn count_analytics(conn: &Connection, scope: Option<&str>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM analytics WHERE ?1 IS NULL OR scope = ?1",
        [scope],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Scopes holding analytics strictly older than the cutoff
pub fn pending_scopes(conn: &Connection, cutoff: &DateTime<Utc>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT scope FROM analytics WHERE searched_at < ?1 ORDER BY scope",
    )?;
    let scopes = stmt
        .query_map([format_timestamp(cutoff)], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(scopes)
}

/// Analytics in the scope strictly older than the cutoff
pub fn count_pending(conn: &Connection, scope: &str, cutoff: &DateTime<Utc>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM analytics WHERE scope = ?1 AND searched_at < ?2",
        params![scope, format_timestamp(cutoff)],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Every scope the store knows about
pub fn list_scopes(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT scope FROM suggestions
         UNION SELECT scope FROM analytics
         UNION SELECT scope FROM archives
         ORDER BY scope",
    )?;
    let scopes = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(scopes)
}

// -----------------------------------------------------------------------------
// Archives
// -----------------------------------------------------------------------------

const ARCHIVE_SELECT: &str = "SELECT a.id, a.scope, a.archive_date, a.created_at,
        (SELECT COUNT(*) FROM archived r WHERE r.archive_id = a.id)
     FROM archives a";

/// Batch for the scope on the given day, created if missing
pub fn ensure_archive(
    conn: &Connection,
    scope: &str,
    archive_date: NaiveDate,
    at: &DateTime<Utc>,
) -> Result<ArchiveBatch> {
    let date = archive_date.format(DATE_FORMAT).to_string();
    conn.execute(
        "INSERT INTO archives (scope, archive_date, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(scope, archive_date) DO NOTHING",
        params![scope, date, format_timestamp(at)],
    )?;

    let sql = format!("{} WHERE a.scope = ?1 AND a.archive_date = ?2", ARCHIVE_SELECT);
    Ok(conn.query_row(&sql, params![scope, date], archive_from_row)?)
}

/// Copy the scope's analytics older than the cutoff into the batch, then
/// delete the originals. Returns the number of records moved.
///
/// Must run inside a transaction: the copy and the delete commit together.
pub fn move_into_archive(
    conn: &Connection,
    archive_id: i64,
    scope: &str,
    cutoff: &DateTime<Utc>,
) -> Result<usize> {
    let cutoff = format_timestamp(cutoff);

    let copied = conn.execute(
        "INSERT INTO archived (archive_id, source_id, scope, query, result_count, searched_at)
         SELECT ?1, id, scope, query, result_count, searched_at
         FROM analytics WHERE scope = ?2 AND searched_at < ?3",
        params![archive_id, scope, cutoff],
    )?;

    let deleted = conn.execute(
        "DELETE FROM analytics
         WHERE scope = ?2 AND searched_at < ?3
           AND id IN (SELECT source_id FROM archived WHERE archive_id = ?1)",
        params![archive_id, scope, cutoff],
    )?;

    if copied != deleted {
        return Err(Error::Inconsistent(format!(
            "archived {} analytics for scope '{}' but removed {}",
            copied, scope, deleted
        )));
    }

    Ok(copied)
}

pub fn get_archive(conn: &Connection, id: i64) -> Result<ArchiveBatch> {
    let sql = format!("{} WHERE a.id = ?1", ARCHIVE_SELECT);
    conn.query_row(&sql, [id], archive_from_row)
        .optional()?
        .ok_or_else(|| Error::NotFound(format!("archive #{}", id)))
}

pub fn list_archives(conn: &Connection, scope: Option<&str>) -> Result<Vec<ArchiveBatch>> {
    let sql = format!(
        "{} WHERE ?1 IS NULL OR a.scope = ?1 ORDER BY a.scope, a.archive_date",
        ARCHIVE_SELECT
    );
    let mut stmt = conn.prepare(&sql)?;
    let archives = stmt
        .query_map([scope], archive_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(archives)
}

pub fn list_archived(conn: &Connection, archive_id: i64) -> Result<Vec<ArchivedRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, archive_id, source_id, scope, query, result_count, searched_at
         FROM archived WHERE archive_id = ?1 ORDER BY searched_at, source_id",
    )?;
    let records = stmt
        .query_map([archive_id], archived_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}

pub fn count_archived(conn: &Connection, scope: Option<&str>) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM archived WHERE ?1 IS NULL OR scope = ?1",
        [scope],
        |row| row.get(0),
    )?;
    Ok(count)
}
