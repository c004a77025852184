//! # QSS - Query Suggestion Store
//!
//! Search suggestions learned from user queries, plus archival of the raw
//! search analytics they came from.
//!
//! QSS provides:
//! - **Suggestion recording**: every search that finds something counts its
//!   query as a suggestion term for the scope it ran in
//! - **Ranking** of approved suggestions by frequency, with autocomplete
//! - **Approval** of suggestions by actors holding the management right
//! - **Archival** of analytics past their retention, one transaction per scope
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use qss::{ArchivePolicy, Config, RankingQuery, Store, SuggestionStore};
//!
//! let store = Store::open("~/.cache/qss/suggestions.sqlite").unwrap();
//! let config = Config::default();
//!
//! // Called by the search page after each query
//! let suggestions = SuggestionStore::new(&store, config.suggestions);
//! suggestions.record_search("docs", "rust async", 12).unwrap();
//!
//! // Autocomplete
//! let ranking = RankingQuery::new(&store);
//! let hits = ranking.complete("docs", "rust", 5).unwrap();
//!
//! // Nightly
//! let policy = ArchivePolicy::new(&store, config.archive);
//! let report = policy.run(chrono::Utc::now()).unwrap();
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod permissions;
pub mod ranking;
pub mod store;
pub mod suggestions;

// Re-exports for convenience
pub use archive::{ArchivePolicy, ArchiveReport};
pub use config::{ArchiveConfig, Config, SuggestionConfig};
pub use error::{Error, Result};
pub use permissions::{Actor, PermissionCode, Permissions, MANAGE_SUGGESTIONS};
pub use ranking::{RankingQuery, SuggestionView};
pub use store::{AnalyticRecord, ArchiveBatch, ArchivedRecord, Store, Suggestion};
pub use suggestions::{SuggestionDraft, SuggestionStore, MIN_TERM_LENGTH};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default database path
pub fn default_db_path() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("qss")
        .join("suggestions.sqlite")
}
