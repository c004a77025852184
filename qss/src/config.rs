//! Configuration for QSS
//!
//! Loaded from an optional YAML file. Every field has a default, so an
//! empty or missing file yields the same behaviour as the built-in defaults:
//! suggestions enabled, manual approval, archive everything on each run.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Suggestion recording flags
    pub suggestions: SuggestionConfig,
    /// Archival retention policy
    pub archive: ArchiveConfig,
    /// Actor ids granted suggestion-management rights
    pub managers: Vec<String>,
}

/// Flags controlling how user queries become suggestions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestionConfig {
    /// When false, recording queries never touches suggestions
    pub enabled: bool,
    /// Newly observed terms start out approved
    pub automatic_approval: bool,
}

impl Default for SuggestionConfig {
    fn default() -> Self {
        SuggestionConfig {
            enabled: true,
            automatic_approval: false,
        }
    }
}

/// Retention policy for raw analytics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Keep analytics younger than this many days live.
    /// `None` archives every record on each run.
    pub retention_days: Option<u32>,
}

impl ArchiveConfig {
    /// Records strictly older than the returned instant are archived.
    ///
    /// A retention reaching past the earliest representable instant
    /// archives nothing.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.retention_days {
            Some(days) => Duration::try_days(i64::from(days))
                .and_then(|keep| now.checked_sub_signed(keep))
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            None => now,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&text)
    }

    /// Load configuration if the file exists, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!("No config at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Parse configuration from YAML text
    pub fn from_yaml(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    /// Whether the actor id is listed as a suggestion manager
    pub fn is_manager(&self, actor_id: &str) -> bool {
        self.managers.iter().any(|m| m == actor_id)
    }
}

/// Default configuration file path
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("qss")
        .join("config.yaml")
}
