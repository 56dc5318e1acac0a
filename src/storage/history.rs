use chrono::Utc;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::fs::{read_json, write_json_atomic};
use super::types::{Article, HistoryDocument, HistorySaveOutcome, StoreError};

/// Record of article ids already forwarded to the notifier.
///
/// The history is bounded by what is still retained: every save intersects
/// the posted set with the ids currently held by at least one category, so
/// entries disappear once their article ages out everywhere.
#[derive(Debug, Clone)]
pub struct HistoryTracker {
    path: PathBuf,
}

impl HistoryTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the posted-id set.
    ///
    /// Never fails: a missing or unreadable history is treated as empty, which
    /// at worst re-announces retained articles.
    pub async fn load(&self) -> HashSet<String> {
        match read_json::<HistoryDocument>(&self.path).await {
            Ok(Some(doc)) => doc.posted_ids.into_iter().collect(),
            Ok(None) => {
                tracing::debug!(path = %self.path.display(), "No post history yet, starting empty");
                HashSet::new()
            }
            Err(e) => {
                tracing::warn!(error = %e, "Post history unreadable, starting empty");
                HashSet::new()
            }
        }
    }

    /// Persist `posted ∩ valid`.
    ///
    /// `valid` is the union of every id retained across all categories after
    /// this cycle's merges.
    pub async fn save(
        &self,
        posted: &HashSet<String>,
        valid: &HashSet<String>,
    ) -> Result<HistorySaveOutcome, StoreError> {
        let kept: Vec<String> = posted.intersection(valid).cloned().collect();
        let outcome = HistorySaveOutcome {
            persisted: kept.len(),
            pruned: posted.len() - kept.len(),
        };
        self.persist(kept).await?;

        tracing::info!(
            persisted = outcome.persisted,
            pruned = outcome.pruned,
            "Saved post history"
        );
        Ok(outcome)
    }

    /// Persist `posted` as-is, for cycles where the retained set is unknown.
    pub async fn save_unpruned(
        &self,
        posted: &HashSet<String>,
    ) -> Result<HistorySaveOutcome, StoreError> {
        let outcome = HistorySaveOutcome {
            persisted: posted.len(),
            pruned: 0,
        };
        self.persist(posted.iter().cloned().collect()).await?;

        tracing::info!(
            persisted = outcome.persisted,
            "Saved post history without pruning"
        );
        Ok(outcome)
    }

    async fn persist(&self, mut ids: Vec<String>) -> Result<(), StoreError> {
        ids.sort_unstable();
        let doc = HistoryDocument {
            posted_ids: ids,
            last_updated: Utc::now(),
        };
        write_json_atomic(&self.path, &doc).await
    }
}

/// Articles whose id has not been posted yet, in input order.
pub fn filter_unseen(articles: &[Article], posted: &HashSet<String>) -> Vec<Article> {
    articles
        .iter()
        .filter(|a| !posted.contains(&a.id))
        .cloned()
        .collect()
}

/// Record every article in `articles` as posted.
pub fn mark_posted(posted: &mut HashSet<String>, articles: &[Article]) {
    posted.extend(articles.iter().map(|a| a.id.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn article(id: &str) -> Article {
        Article {
            id: id.to_string(),
            title: String::new(),
            link: String::new(),
            published_at: DateTime::<Utc>::from_timestamp(0, 0).unwrap(),
            snippet: String::new(),
        }
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_missing_history_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = HistoryTracker::new(dir.path().join("post-history.json"));

        assert!(tracker.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_history_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post-history.json");
        std::fs::write(&path, "not json at all").unwrap();

        let tracker = HistoryTracker::new(&path);
        assert!(tracker.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_save_prunes_to_valid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = HistoryTracker::new(dir.path().join("data").join("post-history.json"));

        let outcome = tracker
            .save(&set(&["a", "b"]), &set(&["b", "c"]))
            .await
            .unwrap();

        assert_eq!(outcome, HistorySaveOutcome { persisted: 1, pruned: 1 });
        assert_eq!(tracker.load().await, set(&["b"]));
    }

    #[tokio::test]
    async fn test_save_unpruned_keeps_everything() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = HistoryTracker::new(dir.path().join("post-history.json"));

        tracker.save_unpruned(&set(&["a", "b"])).await.unwrap();

        assert_eq!(tracker.load().await, set(&["a", "b"]));
    }

    #[tokio::test]
    async fn test_saved_ids_are_sorted_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post-history.json");
        let tracker = HistoryTracker::new(&path);
        let ids = set(&["c", "a", "b"]);

        tracker.save(&ids, &ids).await.unwrap();

        let doc: HistoryDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.posted_ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_filter_unseen_preserves_order() {
        let articles = vec![article("c"), article("a"), article("b"), article("d")];

        let unseen = filter_unseen(&articles, &set(&["a", "d"]));

        let ids: Vec<&str> = unseen.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b"]);
    }

    #[test]
    fn test_mark_posted_adds_ids() {
        let mut posted = set(&["a"]);

        mark_posted(&mut posted, &[article("b"), article("a")]);

        assert_eq!(posted, set(&["a", "b"]));
    }

    #[test]
    fn test_history_document_field_names() {
        let doc = HistoryDocument {
            posted_ids: vec!["x".into()],
            last_updated: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["postedIds"][0], "x");
        assert!(json["lastUpdated"].is_string());
    }

    proptest! {
        #[test]
        fn prop_filter_unseen_is_set_difference(
            ids in proptest::collection::vec("[a-h]", 0..16),
            posted in proptest::collection::hash_set("[a-h]", 0..8),
        ) {
            let articles: Vec<Article> = ids.iter().map(|id| article(id)).collect();
            let unseen = filter_unseen(&articles, &posted);

            let expected: Vec<&String> = ids.iter().filter(|id| !posted.contains(*id)).collect();
            let actual: Vec<&String> = unseen.iter().map(|a| &a.id).collect();
            prop_assert_eq!(actual, expected);
        }

        #[test]
        fn prop_pruned_history_is_subset_of_valid(
            posted in proptest::collection::hash_set("[a-h]", 0..8),
            valid in proptest::collection::hash_set("[a-h]", 0..8),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let dir = tempfile::tempdir().unwrap();
            let tracker = HistoryTracker::new(dir.path().join("post-history.json"));

            let loaded = rt.block_on(async {
                tracker.save(&posted, &valid).await.unwrap();
                tracker.load().await
            });

            prop_assert!(loaded.is_subset(&valid));
            prop_assert!(loaded.is_subset(&posted));
        }
    }
}
