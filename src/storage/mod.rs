mod articles;
mod fs;
mod history;
mod index;
mod types;

pub use articles::{merge_articles, retention_cutoff, ArticleStore};
pub use history::{filter_unseen, mark_posted, HistoryTracker};
pub use index::INDEX_FILE_NAME;
pub use types::{
    Article, CategoryDocument, HistoryDocument, HistorySaveOutcome, IndexEntry, IndexSummary,
    StoreError,
};
