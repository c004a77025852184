//! Archival of past search analytics
//!
//! Each run moves analytics older than a cutoff into a per-scope archive
//! batch. The move for one scope is a single transaction: the copy and the
//! delete commit together or not at all. A failing scope is reported and
//! skipped; the remaining scopes still archive. Suggestions are never
//! touched.

use crate::config::ArchiveConfig;
use crate::error::Result;
use crate::store::{queries, ArchiveBatch, Store};
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// Archival result for one scope
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScopeArchive {
    /// Batch the records were moved into (after the move)
    pub batch: ArchiveBatch,
    /// Records moved by this run
    pub records_moved: usize,
    /// Whether this run created the batch
    pub created: bool,
}

/// A scope whose archival rolled back
#[derive(Debug, Clone, serde::Serialize)]
pub struct ScopeFailure {
    pub scope: String,
    pub error: String,
}

/// Summary of an archival run
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ArchiveReport {
    pub archived: Vec<ScopeArchive>,
    pub failures: Vec<ScopeFailure>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ArchiveReport {
    /// Total records moved across scopes
    pub fn records_moved(&self) -> usize {
        self.archived.iter().map(|a| a.records_moved).sum()
    }

    /// Batches created by this run
    pub fn batches_created(&self) -> usize {
        self.archived.iter().filter(|a| a.created).count()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Archive policy
pub struct ArchivePolicy<'a> {
    store: &'a Store,
    config: ArchiveConfig,
}

impl<'a> ArchivePolicy<'a> {
    pub fn new(store: &'a Store, config: ArchiveConfig) -> Self {
        ArchivePolicy { store, config }
    }

    /// Archive using the configured retention
    pub fn run(&self, now: DateTime<Utc>) -> Result<ArchiveReport> {
        self.run_archival(now, self.config.cutoff(now))
    }

    /// Move analytics strictly older than `cutoff` into archive batches.
    ///
    /// Batches are keyed by scope and the UTC day of `now`, so repeated
    /// runs on one day fill the same batch. Running again with nothing new
    /// to archive creates nothing.
    pub fn run_archival(
        &self,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<ArchiveReport> {
        let start = Instant::now();
        let mut report = ArchiveReport::default();

        let scopes = self
            .store
            .read(|conn| queries::pending_scopes(conn, &cutoff))?;

        for scope in scopes {
            match self.archive_scope(&scope, now, cutoff) {
                Ok(Some(archived)) => {
                    tracing::debug!(
                        "Archived {} analytics for scope '{}' into batch #{}",
                        archived.records_moved,
                        scope,
                        archived.batch.id
                    );
                    report.archived.push(archived);
                }
                // Someone else archived it between listing and locking
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Archival failed for scope '{}': {}", scope, e);
                    report.failures.push(ScopeFailure {
                        scope,
                        error: e.to_string(),
                    });
                }
            }
        }

        report.duration = start.elapsed();
        tracing::info!(
            "Archival complete: {} records in {} scopes, {} failures ({:?})",
            report.records_moved(),
            report.archived.len(),
            report.failures.len(),
            report.duration
        );
        Ok(report)
    }

    /// Archive one scope inside its own transaction
    fn archive_scope(
        &self,
        scope: &str,
        now: DateTime<Utc>,
        cutoff: DateTime<Utc>,
    ) -> Result<Option<ScopeArchive>> {
        self.store.write(|tx| {
            // Re-check under the write lock
            if queries::count_pending(tx, scope, &cutoff)? == 0 {
                return Ok(None);
            }

            let before = queries::ensure_archive(tx, scope, now.date_naive(), &now)?;
            let records_moved = queries::move_into_archive(tx, before.id, scope, &cutoff)?;
            let batch = queries::get_archive(tx, before.id)?;

            Ok(Some(ScopeArchive {
                created: before.record_count == 0,
                batch,
                records_moved,
            }))
        })
    }
}
