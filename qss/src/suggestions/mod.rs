//! Suggestion recording and management
//!
//! [`SuggestionStore`] turns executed searches into suggestion terms,
//! validates terms, and lets authorised actors approve or remove them.

use crate::config::SuggestionConfig;
use crate::error::{Error, Result};
use crate::permissions::{Actor, PermissionCode, Permissions};
use crate::store::{queries, AnalyticRecord, Store, Suggestion};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Minimum autocomplete length, in characters
pub const MIN_TERM_LENGTH: usize = 3;

/// A suggestion as proposed for creation or update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionDraft {
    pub scope: String,
    pub term: String,
    pub approved: bool,
}

impl SuggestionDraft {
    pub fn new(scope: impl Into<String>, term: impl Into<String>) -> Self {
        SuggestionDraft {
            scope: scope.into(),
            term: term.into(),
            approved: false,
        }
    }
}

impl From<&Suggestion> for SuggestionDraft {
    fn from(suggestion: &Suggestion) -> Self {
        SuggestionDraft {
            scope: suggestion.scope.clone(),
            term: suggestion.term.clone(),
            approved: suggestion.approved,
        }
    }
}

/// Extra validation run after the built-in length and uniqueness checks
pub type ValidationHook = Box<dyn Fn(&SuggestionDraft) -> Result<()> + Send + Sync>;

/// Outcome of logging one executed search
#[derive(Debug, Clone)]
pub struct RecordedSearch {
    /// The analytic row written for the search
    pub analytic: AnalyticRecord,
    /// The suggestion created or bumped, if the query qualified
    pub suggestion: Option<Suggestion>,
}

/// Whether a query is long enough to become a suggestion
pub fn meets_min_length(term: &str) -> bool {
    term.chars().count() >= MIN_TERM_LENGTH
}

/// Suggestion store
pub struct SuggestionStore<'a> {
    store: &'a Store,
    config: SuggestionConfig,
    permissions: Arc<dyn Permissions>,
    validators: Vec<ValidationHook>,
}

impl<'a> SuggestionStore<'a> {
    /// Create a suggestion store using the default permission-code policy
    pub fn new(store: &'a Store, config: SuggestionConfig) -> Self {
        Self::with_permissions(store, config, Arc::new(PermissionCode))
    }

    /// Create a suggestion store with a custom permission policy
    pub fn with_permissions(
        store: &'a Store,
        config: SuggestionConfig,
        permissions: Arc<dyn Permissions>,
    ) -> Self {
        SuggestionStore {
            store,
            config,
            permissions,
            validators: Vec::new(),
        }
    }

    /// Register a validation hook
    pub fn add_validator<F>(&mut self, hook: F)
    where
        F: Fn(&SuggestionDraft) -> Result<()> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(hook));
    }

    pub fn config(&self) -> &SuggestionConfig {
        &self.config
    }

    fn require_manager(&self, actor: &Actor) -> Result<()> {
        if self.permissions.can_manage_suggestions(actor) {
            Ok(())
        } else {
            tracing::warn!("Actor '{}' denied suggestion management", actor.id);
            Err(Error::PermissionDenied(actor.id.clone()))
        }
    }

    // -------------------------------------------------------------------------
    // Recording
    // -------------------------------------------------------------------------

    /// Count one observation of a term.
    ///
    /// Creates the suggestion with frequency 1 on first sight, otherwise
    /// increments it. Terms below the minimum length, and every term while
    /// suggestions are disabled, are ignored (`Ok(None)`).
    pub fn record_query(&self, scope: &str, term: &str) -> Result<Option<Suggestion>> {
        self.record_query_at(scope, term, Utc::now())
    }

    /// [`record_query`](Self::record_query) with an explicit timestamp
    pub fn record_query_at(
        &self,
        scope: &str,
        term: &str,
        at: DateTime<Utc>,
    ) -> Result<Option<Suggestion>> {
        if !self.config.enabled || !meets_min_length(term) {
            return Ok(None);
        }
        let suggestion = self.store.write(|tx| {
            queries::increment_suggestion(tx, scope, term, self.config.automatic_approval, &at)
        })?;
        tracing::debug!(
            "Recorded '{}' in scope '{}' (frequency {})",
            term,
            scope,
            suggestion.frequency
        );
        Ok(Some(suggestion))
    }

    /// Log an executed search and, when it found something, count the
    /// query as a suggestion. Both writes commit together.
    pub fn record_search(
        &self,
        scope: &str,
        query: &str,
        result_count: usize,
    ) -> Result<RecordedSearch> {
        self.record_search_at(scope, query, result_count, Utc::now())
    }

    /// [`record_search`](Self::record_search) with an explicit timestamp
    pub fn record_search_at(
        &self,
        scope: &str,
        query: &str,
        result_count: usize,
        at: DateTime<Utc>,
    ) -> Result<RecordedSearch> {
        let term = query.trim();
        let counts_as_suggestion =
            self.config.enabled && result_count > 0 && meets_min_length(term);

        let recorded = self.store.write(|tx| {
            let analytic = queries::insert_analytic(tx, scope, query, result_count as i64, &at)?;
            let suggestion = if counts_as_suggestion {
                Some(queries::increment_suggestion(
                    tx,
                    scope,
                    term,
                    self.config.automatic_approval,
                    &at,
                )?)
            } else {
                None
            };
            Ok(RecordedSearch {
                analytic,
                suggestion,
            })
        })?;

        tracing::debug!(
            "Logged search '{}' in scope '{}' ({} results)",
            query,
            scope,
            result_count
        );
        Ok(recorded)
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    /// Validate a candidate suggestion.
    ///
    /// `excluding` is the id of the suggestion being edited, so it does not
    /// count as its own duplicate.
    pub fn validate(&self, candidate: &SuggestionDraft, excluding: Option<i64>) -> Result<()> {
        if !meets_min_length(&candidate.term) {
            return Err(Error::TooShort {
                term: candidate.term.clone(),
                min: MIN_TERM_LENGTH,
            });
        }

        let taken = self.store.read(|conn| {
            queries::term_taken(conn, &candidate.scope, &candidate.term, excluding)
        })?;
        if taken {
            return Err(Error::Duplicate {
                scope: candidate.scope.clone(),
                term: candidate.term.clone(),
            });
        }

        for hook in &self.validators {
            hook(candidate)?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Administration
    // -------------------------------------------------------------------------

    /// Add a suggestion by hand. It starts with frequency 0.
    pub fn create(&self, candidate: &SuggestionDraft, actor: &Actor) -> Result<Suggestion> {
        self.require_manager(actor)?;
        self.validate(candidate, None)?;

        // The insert re-checks uniqueness, so a racing writer still yields Duplicate
        let now = Utc::now();
        let suggestion = self.store.write(|tx| {
            queries::insert_suggestion(
                tx,
                &candidate.scope,
                &candidate.term,
                0,
                candidate.approved,
                &now,
            )
        })?;

        tracing::info!(
            "Actor '{}' added suggestion '{}' to scope '{}'",
            actor.id,
            suggestion.term,
            suggestion.scope
        );
        Ok(suggestion)
    }

    /// Approve or withdraw a suggestion
    pub fn set_approval(
        &self,
        scope: &str,
        term: &str,
        approved: bool,
        actor: &Actor,
    ) -> Result<Suggestion> {
        self.require_manager(actor)?;

        let now = Utc::now();
        let suggestion = self
            .store
            .write(|tx| queries::set_approved(tx, scope, term, approved, &now))?
            .ok_or_else(|| not_found(scope, term))?;

        tracing::info!(
            "Actor '{}' set '{}' in scope '{}' to {}",
            actor.id,
            term,
            scope,
            if approved { "approved" } else { "unapproved" }
        );
        Ok(suggestion)
    }

    /// Remove a suggestion
    pub fn delete(&self, scope: &str, term: &str, actor: &Actor) -> Result<()> {
        self.require_manager(actor)?;

        if !self
            .store
            .write(|tx| queries::delete_suggestion(tx, scope, term))?
        {
            return Err(not_found(scope, term));
        }

        tracing::info!(
            "Actor '{}' removed suggestion '{}' from scope '{}'",
            actor.id,
            term,
            scope
        );
        Ok(())
    }

    /// Look up a suggestion
    pub fn get(&self, scope: &str, term: &str) -> Result<Suggestion> {
        self.store
            .find_suggestion(scope, term)?
            .ok_or_else(|| not_found(scope, term))
    }
}

fn not_found(scope: &str, term: &str) -> Error {
    Error::NotFound(format!("suggestion '{}' in scope '{}'", term, scope))
}
