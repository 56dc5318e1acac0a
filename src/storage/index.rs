use chrono::{DateTime, Utc};

use super::articles::ArticleStore;
use super::fs::write_json_atomic;
use super::types::{IndexEntry, IndexSummary, StoreError};
use crate::config::Category;

/// File name of the cross-category summary inside the data dir.
pub const INDEX_FILE_NAME: &str = "index.json";

impl ArticleStore {
    /// Re-read every category's persisted collection and rewrite `index.json`.
    ///
    /// Categories are listed in configuration order. A category that has never
    /// been written, or whose document cannot be read, counts as zero articles.
    pub async fn regenerate_index(&self, categories: &[Category]) -> Result<IndexSummary, StoreError> {
        self.regenerate_index_at(categories, Utc::now()).await
    }

    pub async fn regenerate_index_at(
        &self,
        categories: &[Category],
        now: DateTime<Utc>,
    ) -> Result<IndexSummary, StoreError> {
        let mut entries = Vec::with_capacity(categories.len());
        for category in categories {
            let article_count = match self.load(&category.id).await {
                Ok(articles) => articles.len(),
                Err(e) => {
                    tracing::warn!(
                        category = %category.id,
                        error = %e,
                        "Unreadable category counted as empty in index"
                    );
                    0
                }
            };
            entries.push(IndexEntry {
                id: category.id.clone(),
                name: category.name.clone(),
                article_count,
                data_file: Self::data_file_name(&category.id),
            });
        }

        let summary = IndexSummary {
            categories: entries,
            generated_at: now,
        };
        write_json_atomic(&self.data_dir().join(INDEX_FILE_NAME), &summary).await?;

        tracing::info!(
            categories = summary.categories.len(),
            path = %self.data_dir().join(INDEX_FILE_NAME).display(),
            "Regenerated index"
        );
        Ok(summary)
    }
}
