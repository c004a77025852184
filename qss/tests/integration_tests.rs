//! Integration tests for QSS
//!
//! These tests drive the library the way a search page and a nightly
//! scheduler would:
//! - Logging searches and learning suggestions
//! - Ranking and approval
//! - Archival of analytics, alone and alongside live traffic

use chrono::{DateTime, Duration, TimeZone, Utc};
use qss::{
    Actor, ArchiveConfig, ArchivePolicy, Error, RankingQuery, Store, SuggestionConfig,
    SuggestionDraft, SuggestionStore,
};
use std::collections::HashSet;
use tempfile::tempdir;

const SCOPE: &str = "search-page";

/// Minimal stand-in for the search engine: titles containing the query
struct Site {
    titles: Vec<&'static str>,
}

impl Site {
    fn search(&self, query: &str) -> usize {
        let query = query.to_lowercase();
        self.titles
            .iter()
            .filter(|title| title.to_lowercase().contains(&query))
            .count()
    }

    /// Execute a search and log it, like the search page does
    fn execute(&self, suggestions: &SuggestionStore<'_>, query: &str, at: DateTime<Utc>) -> usize {
        let results = self.search(query);
        suggestions
            .record_search_at(SCOPE, query, results, at)
            .unwrap();
        results
    }
}

fn morning(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, minute, 0).unwrap()
}

fn evening() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 23, 0, 0).unwrap()
}

#[test]
fn test_search_analytics_and_archival() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    let site = Site {
        titles: vec!["Test"],
    };

    assert_eq!(store.count_suggestions(Some(SCOPE)).unwrap(), 0);
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 0);

    // Doesn't match the page: one analytic, no suggestion
    assert_eq!(site.execute(&suggestions, "Nothing", morning(0)), 0);
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 1);
    assert_eq!(store.count_suggestions(Some(SCOPE)).unwrap(), 0);

    // Finds the page: two analytics, one suggestion
    assert_eq!(site.execute(&suggestions, "Test", morning(1)), 1);
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 2);
    assert_eq!(store.count_suggestions(Some(SCOPE)).unwrap(), 1);
    assert_eq!(suggestions.get(SCOPE, "Test").unwrap().frequency, 1);

    // Nightly archival with the default policy archives everything
    let policy = ArchivePolicy::new(&store, ArchiveConfig::default());
    let report = policy.run(evening()).unwrap();
    assert!(report.is_success());

    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 0);
    assert_eq!(store.count_suggestions(Some(SCOPE)).unwrap(), 1);

    // A single archive containing both analytics
    let archives = store.list_archives(Some(SCOPE)).unwrap();
    assert_eq!(archives.len(), 1);
    assert_eq!(store.list_archived(archives[0].id).unwrap().len(), 2);
}

#[test]
fn test_archival_preserves_suggestions() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    let site = Site {
        titles: vec!["Rust Guide", "Rustup Install", "Python Basics"],
    };

    for (minute, query) in ["rust", "rust", "python", "rustup", "golang"].iter().enumerate() {
        site.execute(&suggestions, query, morning(minute as u32));
    }
    suggestions
        .set_approval(SCOPE, "rust", true, &Actor::manager("admin"))
        .unwrap();

    let ranking = RankingQuery::new(&store);
    let before = ranking.list_all(SCOPE).unwrap();
    let rust = suggestions.get(SCOPE, "rust").unwrap();
    let pct_before = ranking.frequency_percentage(&rust).unwrap();

    ArchivePolicy::new(&store, ArchiveConfig::default())
        .run(evening())
        .unwrap();

    assert_eq!(ranking.list_all(SCOPE).unwrap(), before);
    assert_eq!(ranking.frequency_percentage(&rust).unwrap(), pct_before);
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 0);
    assert_eq!(store.count_archived(Some(SCOPE)).unwrap(), 5);
}

#[test]
fn test_archival_twice_creates_nothing_new() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    suggestions.record_search_at(SCOPE, "rust", 1, morning(0)).unwrap();
    suggestions.record_search_at("blog", "serde", 1, morning(1)).unwrap();

    let policy = ArchivePolicy::new(&store, ArchiveConfig::default());
    let first = policy.run(evening()).unwrap();
    assert_eq!(first.batches_created(), 2);

    let archives = store.list_archives(None).unwrap();
    let archived = store.count_archived(None).unwrap();

    let second = policy.run(evening() + Duration::minutes(5)).unwrap();
    assert!(second.archived.is_empty());
    assert!(second.failures.is_empty());
    assert_eq!(store.list_archives(None).unwrap(), archives);
    assert_eq!(store.count_archived(None).unwrap(), archived);
}

#[test]
fn test_frequency_matches_query_count() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());

    for (term, n) in [("rust", 1), ("tokio", 7), ("serde json", 3)] {
        for _ in 0..n {
            suggestions.record_query(SCOPE, term).unwrap();
        }
        let suggestion = suggestions.get(SCOPE, term).unwrap();
        assert_eq!(suggestion.frequency, n);
    }
    assert_eq!(store.count_suggestions(Some(SCOPE)).unwrap(), 3);
}

#[test]
fn test_short_terms_never_become_suggestions() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());

    for term in ["", "a", "go", "C#", "日本"] {
        assert!(suggestions.record_query(SCOPE, term).unwrap().is_none());
        let logged = suggestions.record_search(SCOPE, term, 10).unwrap();
        assert!(logged.suggestion.is_none());
    }

    // Queries are trimmed before the length check
    assert!(suggestions.record_search(SCOPE, "  x  ", 10).unwrap().suggestion.is_none());

    assert_eq!(store.count_suggestions(None).unwrap(), 0);
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 6);
}

#[test]
fn test_ranking_only_shows_approved() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    let admin = Actor::manager("admin");

    for term in ["beta", "alpha", "gamma", "gamma", "delta", "delta"] {
        suggestions.record_query(SCOPE, term).unwrap();
    }
    for term in ["alpha", "beta", "delta"] {
        suggestions.set_approval(SCOPE, term, true, &admin).unwrap();
    }

    let listed = RankingQuery::new(&store).list_suggestions(SCOPE).unwrap();
    let terms: Vec<&str> = listed.iter().map(|s| s.term.as_str()).collect();
    assert_eq!(terms, vec!["delta", "alpha", "beta"]);
    assert!(listed.iter().all(|s| s.approved));
    assert!(listed.windows(2).all(|w| {
        w[0].frequency > w[1].frequency || (w[0].frequency == w[1].frequency && w[0].term < w[1].term)
    }));
}

#[test]
fn test_duplicate_validation() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    suggestions.record_query(SCOPE, "rust").unwrap();

    let err = suggestions
        .create(&SuggestionDraft::new(SCOPE, "rust"), &Actor::manager("admin"))
        .unwrap_err();
    assert!(matches!(err, Error::Duplicate { .. }));
    assert!(err.is_validation());
    assert_eq!(store.count_suggestions(None).unwrap(), 1);
}

#[test]
fn test_concurrent_recording_same_term() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());

    std::thread::scope(|s| {
        for _ in 0..8 {
            s.spawn(|| {
                for _ in 0..50 {
                    suggestions.record_query(SCOPE, "brand new term").unwrap();
                }
            });
        }
    });

    assert_eq!(store.count_suggestions(None).unwrap(), 1);
    assert_eq!(suggestions.get(SCOPE, "brand new term").unwrap().frequency, 400);
}

#[test]
fn test_concurrent_connections_share_a_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("qss.sqlite");

    // Create the schema up front
    let primary = Store::open(&db_path).unwrap();

    std::thread::scope(|s| {
        for _ in 0..4 {
            let db_path = db_path.clone();
            s.spawn(move || {
                let store = Store::open(&db_path).unwrap();
                let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
                for _ in 0..25 {
                    suggestions.record_search(SCOPE, "shared", 3).unwrap();
                }
            });
        }
    });

    assert_eq!(primary.count_analytics(Some(SCOPE)).unwrap(), 100);
    assert_eq!(
        primary.find_suggestion(SCOPE, "shared").unwrap().unwrap().frequency,
        100
    );
}

#[test]
fn test_archival_alongside_live_recording() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(&store, SuggestionConfig::default());
    let policy = ArchivePolicy::new(&store, ArchiveConfig::default());
    let start = morning(0);

    std::thread::scope(|s| {
        s.spawn(|| {
            for i in 0..200 {
                suggestions
                    .record_search_at(SCOPE, "live", 1, start + Duration::seconds(i))
                    .unwrap();
            }
        });
        s.spawn(|| {
            for i in 0..20 {
                let report = policy.run(start + Duration::seconds(i * 10)).unwrap();
                assert!(report.is_success());
            }
        });
    });

    // Nothing lost, nothing counted twice
    let live = store.count_analytics(Some(SCOPE)).unwrap();
    let archived = store.count_archived(Some(SCOPE)).unwrap();
    assert_eq!(live + archived, 200);

    let mut sources = HashSet::new();
    for batch in store.list_archives(Some(SCOPE)).unwrap() {
        for record in store.list_archived(batch.id).unwrap() {
            assert!(sources.insert(record.source_id));
        }
    }
    for record in store.list_analytics(SCOPE).unwrap() {
        assert!(sources.insert(record.id));
    }
    assert_eq!(sources.len(), 200);

    assert_eq!(suggestions.get(SCOPE, "live").unwrap().frequency, 200);
}

#[test]
fn test_disabled_suggestions_still_log_analytics() {
    let store = Store::open_memory().unwrap();
    let suggestions = SuggestionStore::new(
        &store,
        SuggestionConfig {
            enabled: false,
            automatic_approval: true,
        },
    );

    let logged = suggestions.record_search(SCOPE, "rust", 4).unwrap();
    assert!(logged.suggestion.is_none());
    assert_eq!(store.count_analytics(Some(SCOPE)).unwrap(), 1);
    assert_eq!(store.count_suggestions(None).unwrap(), 0);
}
