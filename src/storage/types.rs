use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while reading or writing the on-disk JSON documents.
///
/// A missing document is never an error; callers get an empty collection
/// instead. Everything else (permissions, full disk, corrupt JSON) surfaces
/// here with the offending path attached.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The document exists but is not valid JSON for its schema.
    #[error("Corrupt document {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Data Structures
// ============================================================================

/// One normalized syndication entry.
///
/// Field names on disk follow the documents the static front-end already
/// reads (`pubDate`, `contentSnippet`), so the JSON stays compatible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Stable identity: the entry's guid, falling back to its link.
    pub id: String,
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate", alias = "publishedAt")]
    pub published_at: DateTime<Utc>,
    /// Plain-text summary, possibly empty.
    #[serde(rename = "contentSnippet", default)]
    pub snippet: String,
}

/// Persisted per-category collection (`<data_dir>/<categoryId>.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryDocument {
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub articles: Vec<Article>,
    pub last_updated: DateTime<Utc>,
}

/// Persisted posted-history document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDocument {
    #[serde(default)]
    pub posted_ids: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Index entry for one category, as consumed by the display layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexEntry {
    pub id: String,
    pub name: String,
    pub article_count: usize,
    pub data_file: String,
}

/// Cross-category summary written to `<data_dir>/index.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub categories: Vec<IndexEntry>,
    pub generated_at: DateTime<Utc>,
}

/// Result of a history save: how many ids were kept and how many pruned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HistorySaveOutcome {
    pub persisted: usize,
    pub pruned: usize,
}
