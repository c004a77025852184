//! Error types for QSS

use thiserror::Error;

/// QSS error type
#[derive(Error, Debug)]
pub enum Error {
    /// Term shorter than the minimum autocomplete length
    #[error("Minimum autocomplete length required: '{term}' is shorter than {min} characters")]
    TooShort { term: String, min: usize },

    /// A suggestion with the same term already exists in the scope
    #[error("Suggestion already exists: '{term}' in scope '{scope}'")]
    Duplicate { scope: String, term: String },

    /// Actor lacks suggestion-management rights
    #[error("Permission denied: '{0}' cannot manage search suggestions")]
    PermissionDenied(String),

    /// No matching suggestion, batch, or scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// Stored state contradicts an invariant
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for QSS operations
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(format!("Invalid YAML: {}", err))
    }
}

impl Error {
    /// Whether this is a validation failure meant for user-facing correction
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::TooShort { .. } | Error::Duplicate { .. })
    }
}
