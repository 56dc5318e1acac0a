use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use super::fs::{read_json, write_json_atomic};
use super::types::{Article, CategoryDocument, StoreError};

/// Per-category article archive backed by one JSON document per category.
///
/// Every save re-derives the whole collection: merged, deduplicated by id,
/// sorted newest-first and filtered to the retention window.
#[derive(Debug, Clone)]
pub struct ArticleStore {
    data_dir: PathBuf,
    retention_days: u32,
}

impl ArticleStore {
    /// Default trailing retention window.
    pub const DEFAULT_RETENTION_DAYS: u32 = 90;

    pub fn new(data_dir: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            data_dir: data_dir.into(),
            retention_days,
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// File name of a category's document, relative to the data dir.
    pub fn data_file_name(category_id: &str) -> String {
        format!("{}.json", category_id)
    }

    pub fn category_path(&self, category_id: &str) -> PathBuf {
        self.data_dir.join(Self::data_file_name(category_id))
    }

    /// Load a category's persisted document, `None` if it was never written.
    pub async fn load_document(
        &self,
        category_id: &str,
    ) -> Result<Option<CategoryDocument>, StoreError> {
        read_json(&self.category_path(category_id)).await
    }

    /// Load a category's persisted articles; a missing document is empty.
    pub async fn load(&self, category_id: &str) -> Result<Vec<Article>, StoreError> {
        Ok(self
            .load_document(category_id)
            .await?
            .map(|doc| doc.articles)
            .unwrap_or_default())
    }

    /// Ids currently persisted for a category.
    pub async fn retained_ids(&self, category_id: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .load(category_id)
            .await?
            .into_iter()
            .map(|a| a.id)
            .collect())
    }

    /// Merge freshly collected articles into a category and persist the result.
    ///
    /// Returns the retained collection exactly as written to disk.
    pub async fn merge(
        &self,
        category_id: &str,
        category_name: &str,
        new_articles: Vec<Article>,
    ) -> Result<Vec<Article>, StoreError> {
        self.merge_at(category_id, category_name, new_articles, Utc::now())
            .await
    }

    /// [`merge`](Self::merge) with an explicit wall-clock reading.
    ///
    /// The retention cutoff is derived once from `now`.
    pub async fn merge_at(
        &self,
        category_id: &str,
        category_name: &str,
        new_articles: Vec<Article>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Article>, StoreError> {
        let cutoff = retention_cutoff(now, self.retention_days);
        let existing = self.load(category_id).await?;
        let existing_count = existing.len();
        let incoming_count = new_articles.len();

        let retained = merge_articles(existing, new_articles, cutoff);

        let doc = CategoryDocument {
            category_id: category_id.to_string(),
            category_name: category_name.to_string(),
            articles: retained,
            last_updated: now,
        };
        write_json_atomic(&self.category_path(category_id), &doc).await?;

        tracing::info!(
            category = %category_id,
            existing = existing_count,
            incoming = incoming_count,
            retained = doc.articles.len(),
            "Merged category articles"
        );

        Ok(doc.articles)
    }
}

/// Oldest `published_at` still inside the window ending at `now`.
pub fn retention_cutoff(now: DateTime<Utc>, retention_days: u32) -> DateTime<Utc> {
    now - Duration::days(i64::from(retention_days))
}

/// Pure merge step: dedup by id (incoming wins, later incoming wins over
/// earlier), sort newest-first, drop anything published before `cutoff`.
///
/// Ties on `published_at` are ordered by id so the output is deterministic.
pub fn merge_articles(
    existing: Vec<Article>,
    incoming: Vec<Article>,
    cutoff: DateTime<Utc>,
) -> Vec<Article> {
    let mut by_id: HashMap<String, Article> =
        HashMap::with_capacity(existing.len() + incoming.len());

    for article in existing.into_iter().chain(incoming) {
        by_id.insert(article.id.clone(), article);
    }

    let mut merged: Vec<Article> = by_id
        .into_values()
        .filter(|a| a.published_at >= cutoff)
        .collect();

    merged.sort_by(|a, b| {
        b.published_at
            .cmp(&a.published_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    merged
}
