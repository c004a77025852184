//! Suggestion ranking and display

use crate::error::{Error, Result};
use crate::permissions::{Actor, PermissionCode, Permissions};
use crate::store::{queries, Store, Suggestion};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Placeholder shown when a suggestion has no observed frequency
pub const NO_VALUE: &str = "-";

/// A suggestion prepared for the management listing
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SuggestionView {
    pub term: String,
    /// Frequency, or `-` when zero
    pub frequency: String,
    /// Share of the scope's searches, e.g. `12.50 %`, or `-`
    pub frequency_percentage: String,
    pub approved: bool,
    /// Whether the viewer may toggle approval
    pub approval_editable: bool,
    /// Columns added by display hooks
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub extra: BTreeMap<String, String>,
}

/// Hook that may adjust a view before it is returned
pub type DisplayHook = Box<dyn Fn(&Suggestion, &mut SuggestionView) + Send + Sync>;

/// Frequency for display: the number, or `-` when zero
pub fn frequency_summary(suggestion: &Suggestion) -> String {
    if suggestion.frequency == 0 {
        NO_VALUE.to_string()
    } else {
        suggestion.frequency.to_string()
    }
}

/// Whether `term` starts with `prefix` under Unicode lowercase folding
pub fn matches_prefix(term: &str, prefix: &str) -> bool {
    term.to_lowercase().starts_with(&prefix.to_lowercase())
}

/// Format a percentage as `12.50 %`, or `-` when there is none
pub fn format_percentage(percentage: Option<f64>) -> String {
    match percentage {
        Some(value) => format!("{:.2} %", value),
        None => NO_VALUE.to_string(),
    }
}

/// Read side of suggestions: ordered listings, autocomplete, percentages
pub struct RankingQuery<'a> {
    store: &'a Store,
    permissions: Arc<dyn Permissions>,
    display_hooks: Vec<DisplayHook>,
}

impl<'a> RankingQuery<'a> {
    /// Create a ranking query using the default permission-code policy
    pub fn new(store: &'a Store) -> Self {
        Self::with_permissions(store, Arc::new(PermissionCode))
    }

    /// Create a ranking query with a custom permission policy
    pub fn with_permissions(store: &'a Store, permissions: Arc<dyn Permissions>) -> Self {
        RankingQuery {
            store,
            permissions,
            display_hooks: Vec::new(),
        }
    }

    /// Register a display hook
    pub fn add_display_hook<F>(&mut self, hook: F)
    where
        F: Fn(&Suggestion, &mut SuggestionView) + Send + Sync + 'static,
    {
        self.display_hooks.push(Box::new(hook));
    }

    /// Approved suggestions, most frequent first, ties by term
    pub fn list_suggestions(&self, scope: &str) -> Result<Vec<Suggestion>> {
        self.store
            .read(|conn| queries::list_suggestions(conn, scope, true))
    }

    /// Every suggestion in the scope, approved or not, in ranking order
    pub fn list_all(&self, scope: &str) -> Result<Vec<Suggestion>> {
        self.store
            .read(|conn| queries::list_suggestions(conn, scope, false))
    }

    /// Approved suggestions starting with `prefix`, ignoring case
    pub fn complete(&self, scope: &str, prefix: &str, limit: usize) -> Result<Vec<Suggestion>> {
        Ok(self
            .list_suggestions(scope)?
            .into_iter()
            .filter(|s| matches_prefix(&s.term, prefix))
            .take(limit)
            .collect())
    }

    /// Searches ever logged for the scope, live and archived
    pub fn total_searches(&self, scope: &str) -> Result<i64> {
        self.store.read(|conn| {
            Ok(queries::count_analytics(conn, Some(scope))?
                + queries::count_archived(conn, Some(scope))?)
        })
    }

    /// The suggestion's share of all searches in its scope, in percent.
    ///
    /// `None` when the suggestion has never been observed. Archived
    /// analytics still count, so archival does not change the value.
    pub fn frequency_percentage(&self, suggestion: &Suggestion) -> Result<Option<f64>> {
        if suggestion.frequency == 0 {
            return Ok(None);
        }

        let total = self.total_searches(&suggestion.scope)?;
        if total == 0 {
            tracing::error!(
                "Suggestion '{}' in scope '{}' has frequency {} but no logged searches",
                suggestion.term,
                suggestion.scope,
                suggestion.frequency
            );
            return Err(Error::Inconsistent(format!(
                "suggestion '{}' in scope '{}' has frequency {} but the scope has no analytics",
                suggestion.term, suggestion.scope, suggestion.frequency
            )));
        }

        Ok(Some(suggestion.frequency as f64 / total as f64 * 100.0))
    }

    /// Build the management view of a suggestion for a viewer
    pub fn present(&self, suggestion: &Suggestion, viewer: Option<&Actor>) -> Result<SuggestionView> {
        let percentage = self.frequency_percentage(suggestion)?;
        let mut view = SuggestionView {
            term: suggestion.term.clone(),
            frequency: frequency_summary(suggestion),
            frequency_percentage: format_percentage(percentage),
            approved: suggestion.approved,
            approval_editable: viewer
                .map(|actor| self.permissions.can_manage_suggestions(actor))
                .unwrap_or(false),
            extra: BTreeMap::new(),
        };

        for hook in &self.display_hooks {
            hook(suggestion, &mut view);
        }
        Ok(view)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SuggestionConfig;
    use crate::suggestions::SuggestionStore;

    fn auto_approving(store: &Store) -> SuggestionStore<'_> {
        SuggestionStore::new(
            store,
            SuggestionConfig {
                automatic_approval: true,
                ..Default::default()
            },
        )
    }

    fn terms(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.term.as_str()).collect()
    }

    #[test]
    fn test_ranking_order() {
        let store = Store::open_memory().unwrap();
        let recorder = auto_approving(&store);

        for term in ["tokio", "serde", "serde", "async", "async", "rust", "rust", "rust"] {
            recorder.record_query("docs", term).unwrap();
        }

        let ranking = RankingQuery::new(&store);
        let listed = ranking.list_suggestions("docs").unwrap();
        assert_eq!(terms(&listed), vec!["rust", "async", "serde", "tokio"]);
    }

    #[test]
    fn test_list_suggestions_only_approved() {
        let store = Store::open_memory().unwrap();
        let recorder = SuggestionStore::new(&store, SuggestionConfig::default());
        recorder.record_query("docs", "rust").unwrap();
        recorder.record_query("docs", "serde").unwrap();
        recorder
            .set_approval("docs", "serde", true, &Actor::manager("admin"))
            .unwrap();

        let ranking = RankingQuery::new(&store);
        assert_eq!(terms(&ranking.list_suggestions("docs").unwrap()), vec!["serde"]);
        assert_eq!(
            terms(&ranking.list_all("docs").unwrap()),
            vec!["rust", "serde"]
        );
    }

    #[test]
    fn test_complete_prefix() {
        let store = Store::open_memory().unwrap();
        let recorder = auto_approving(&store);
        for term in ["Rust", "rustup", "rustup", "ruby", "100%_sure"] {
            recorder.record_query("docs", term).unwrap();
        }

        let ranking = RankingQuery::new(&store);
        assert_eq!(
            terms(&ranking.complete("docs", "rus", 10).unwrap()),
            vec!["rustup", "Rust"]
        );
        assert_eq!(terms(&ranking.complete("docs", "ru", 1).unwrap()), vec!["rustup"]);
        assert_eq!(
            terms(&ranking.complete("docs", "100%", 10).unwrap()),
            vec!["100%_sure"]
        );
        assert!(ranking.complete("docs", "10_", 10).unwrap().is_empty());
    }

    #[test]
    fn test_complete_folds_non_ascii_case() {
        let store = Store::open_memory().unwrap();
        let recorder = auto_approving(&store);
        for term in ["Ärger", "ärmel", "arbeit", "ΣΟΦΙΑ"] {
            recorder.record_query("docs", term).unwrap();
        }

        let ranking = RankingQuery::new(&store);
        assert_eq!(
            terms(&ranking.complete("docs", "är", 10).unwrap()),
            vec!["Ärger", "ärmel"]
        );
        assert_eq!(terms(&ranking.complete("docs", "ÄR", 10).unwrap()), vec!["Ärger", "ärmel"]);
        assert_eq!(terms(&ranking.complete("docs", "σοφ", 10).unwrap()), vec!["ΣΟΦΙΑ"]);
        assert!(matches_prefix("Ärger", "ä"));
        assert!(!matches_prefix("arbeit", "ä"));
    }

    #[test]
    fn test_frequency_percentage() {
        let store = Store::open_memory().unwrap();
        let recorder = auto_approving(&store);

        recorder.record_search("docs", "rust", 3).unwrap();
        recorder.record_search("docs", "rust", 3).unwrap();
        recorder.record_search("docs", "serde", 1).unwrap();
        recorder.record_search("docs", "nothing here", 0).unwrap();

        let ranking = RankingQuery::new(&store);
        let rust = store.find_suggestion("docs", "rust").unwrap().unwrap();
        let pct = ranking.frequency_percentage(&rust).unwrap().unwrap();
        assert!((pct - 50.0).abs() < 1e-9);
        assert_eq!(format_percentage(Some(pct)), "50.00 %");
    }

    #[test]
    fn test_frequency_percentage_zero_frequency() {
        let store = Store::open_memory().unwrap();
        let recorder = SuggestionStore::new(&store, SuggestionConfig::default());
        let draft = crate::suggestions::SuggestionDraft::new("docs", "manual");
        let manual = recorder.create(&draft, &Actor::manager("admin")).unwrap();

        let ranking = RankingQuery::new(&store);
        assert_eq!(ranking.frequency_percentage(&manual).unwrap(), None);
        assert_eq!(frequency_summary(&manual), "-");
    }

    #[test]
    fn test_frequency_percentage_without_analytics_is_inconsistent() {
        let store = Store::open_memory().unwrap();
        // Recorded directly, without the search log the caller should write
        let orphan = auto_approving(&store)
            .record_query("docs", "rust")
            .unwrap()
            .unwrap();

        let ranking = RankingQuery::new(&store);
        assert!(matches!(
            ranking.frequency_percentage(&orphan),
            Err(Error::Inconsistent(_))
        ));
    }

    #[test]
    fn test_present() {
        let store = Store::open_memory().unwrap();
        let recorder = SuggestionStore::new(&store, SuggestionConfig::default());
        recorder.record_search("docs", "rust", 2).unwrap();
        recorder.record_search("docs", "nothing", 0).unwrap();
        recorder.record_search("docs", "nada", 0).unwrap();
        recorder.record_search("docs", "zilch", 0).unwrap();
        let rust = store.find_suggestion("docs", "rust").unwrap().unwrap();

        let mut ranking = RankingQuery::new(&store);
        ranking.add_display_hook(|suggestion, view| {
            view.extra
                .insert("length".to_string(), suggestion.term.len().to_string());
        });

        let view = ranking.present(&rust, Some(&Actor::manager("admin"))).unwrap();
        assert_eq!(view.term, "rust");
        assert_eq!(view.frequency, "1");
        assert_eq!(view.frequency_percentage, "25.00 %");
        assert!(!view.approved);
        assert!(view.approval_editable);
        assert_eq!(view.extra.get("length").map(String::as_str), Some("4"));

        let anonymous = ranking.present(&rust, None).unwrap();
        assert!(!anonymous.approval_editable);
        let guest = ranking.present(&rust, Some(&Actor::new("guest"))).unwrap();
        assert!(!guest.approval_editable);
    }
}
