//! Database schema for QSS

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// SQL to create the database schema
const SCHEMA_SQL: &str = r#"
-- Suggestion terms, one row per (scope, term)
CREATE TABLE IF NOT EXISTS suggestions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    term TEXT NOT NULL,
    frequency INTEGER NOT NULL DEFAULT 0 CHECK (frequency >= 0),
    approved INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(scope, term)
);

CREATE INDEX IF NOT EXISTS idx_suggestions_approved ON suggestions(approved);
CREATE INDEX IF NOT EXISTS idx_suggestions_scope_approved ON suggestions(scope, approved);

-- Raw analytics, one row per executed search
CREATE TABLE IF NOT EXISTS analytics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    query TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    searched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_analytics_scope_time ON analytics(scope, searched_at);

-- Archive batches, at most one per scope and UTC day
CREATE TABLE IF NOT EXISTS archives (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    scope TEXT NOT NULL,
    archive_date TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(scope, archive_date)
);

-- Archived analytics, moved out of the analytics table
CREATE TABLE IF NOT EXISTS archived (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    archive_id INTEGER NOT NULL REFERENCES archives(id),
    source_id INTEGER NOT NULL UNIQUE,
    scope TEXT NOT NULL,
    query TEXT NOT NULL,
    result_count INTEGER NOT NULL,
    searched_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_archived_archive ON archived(archive_id);
CREATE INDEX IF NOT EXISTS idx_archived_scope ON archived(scope);

-- Store state (schema version and the like)
CREATE TABLE IF NOT EXISTS index_state (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Ensure the database schema is up to date
pub fn ensure_schema(conn: &Connection) -> Result<()> {
    // Check if schema exists
    let table_exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='index_state'",
        [],
        |row| row.get(0),
    )?;

    if !table_exists {
        conn.execute_batch(SCHEMA_SQL)?;

        // Another connection may have raced us to it
        conn.execute(
            "INSERT OR IGNORE INTO index_state (key, value) VALUES ('schema_version', ?1)",
            [SCHEMA_VERSION.to_string()],
        )?;

        tracing::info!("Created database schema version {}", SCHEMA_VERSION);
    } else {
        let version: i64 = conn
            .query_row(
                "SELECT CAST(value AS INTEGER) FROM index_state WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if version < SCHEMA_VERSION {
            migrate(conn, version)?;
        }
    }

    Ok(())
}

/// Migrate from an older schema version
fn migrate(conn: &Connection, from_version: i64) -> Result<()> {
    tracing::info!(
        "Migrating database from version {} to {}",
        from_version,
        SCHEMA_VERSION
    );

    // Version 1 tables are all IF NOT EXISTS, so replaying is enough
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR REPLACE INTO index_state (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    Ok(())
}
