//! One synchronization cycle over every configured category.
//!
//! Phases:
//!
//! 1. **Collect + merge** each category (concurrently, bounded). The retained
//!    ids of every category, including ones that failed this cycle, form the
//!    set history is pruned against.
//! 2. **Load history** once every merge has settled.
//! 3. **Announce** unseen articles category by category through the
//!    rate-limited [`Dispatcher`]. An article is marked posted only after its
//!    send succeeds, so failures are retried on the next run.
//! 4. **Persist** the pruned history and regenerate the index.
//!
//! A failure inside one category never stops the others.
use futures::stream::{self, StreamExt};
use secrecy::SecretString;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{Category, Config};
use crate::feed::{FeedCollector, FetchError};
use crate::notify::{Dispatcher, Notifier, NotifyError};
use crate::storage::{
    filter_unseen, mark_posted, Article, ArticleStore, HistorySaveOutcome, HistoryTracker,
    IndexSummary, StoreError,
};

/// What to do with unseen articles this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Forward through the notifier and record successes.
    #[default]
    Send,
    /// Forward nothing and record nothing.
    Skip,
    /// Record every unseen article as posted without forwarding.
    /// Used on first install so the backlog is not announced.
    SeedHistory,
}

/// Why a category produced no (or only some) announcements this run.
#[derive(Debug, Error)]
pub enum CategoryError {
    #[error("All {attempted} feed(s) failed; last error: {last}")]
    AllFeedsFailed { attempted: usize, last: FetchError },

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Notification failed: {0}")]
    Notify(#[from] NotifyError),

    #[error("No webhook configured for this category")]
    NoDestination,
}

/// Outcome for one category.
#[derive(Debug)]
pub struct CategoryReport {
    pub id: String,
    /// Articles held after the merge (0 when the merge failed).
    pub retained: usize,
    /// Feeds that failed while at least one other succeeded.
    pub feed_failures: usize,
    pub sent: usize,
    /// Unseen articles left for a later run.
    pub pending: usize,
    pub error: Option<CategoryError>,
}

impl CategoryReport {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            retained: 0,
            feed_failures: 0,
            sent: 0,
            pending: 0,
            error: None,
        }
    }
}

/// Outcome of a full cycle.
#[derive(Debug)]
pub struct SyncReport {
    pub categories: Vec<CategoryReport>,
    /// False when a failed category's stored ids could not be read, in which
    /// case history was saved without pruning.
    pub pruned: bool,
    pub history: Result<HistorySaveOutcome, StoreError>,
    pub index: Result<IndexSummary, StoreError>,
}

impl SyncReport {
    /// True when any category failed, even if others succeeded.
    pub fn is_partial(&self) -> bool {
        self.categories.iter().any(|c| c.error.is_some())
    }

    pub fn total_sent(&self) -> usize {
        self.categories.iter().map(|c| c.sent).sum()
    }

    pub fn failed_categories(&self) -> usize {
        self.categories.iter().filter(|c| c.error.is_some()).count()
    }
}

/// Drives collect → merge → announce → record for every category.
pub struct SyncOrchestrator {
    categories: Vec<Category>,
    destinations: Vec<Option<SecretString>>,
    collector: FeedCollector,
    store: ArticleStore,
    history: HistoryTracker,
    notifier: Arc<dyn Notifier>,
    notify_interval: Duration,
    notify_timeout: Duration,
    fetch_concurrency: usize,
    mode: NotifyMode,
}

impl SyncOrchestrator {
    /// Build from a validated config.
    pub fn from_config(
        config: &Config,
        collector: FeedCollector,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let destinations = config
            .categories
            .iter()
            .map(|c| config.destination_for(c))
            .collect();

        Self {
            categories: config.categories.clone(),
            destinations,
            collector,
            store: ArticleStore::new(&config.data_dir, config.retention_days),
            history: HistoryTracker::new(&config.history_file),
            notifier,
            notify_interval: config.notify_interval(),
            notify_timeout: config.notify_timeout(),
            fetch_concurrency: config.fetch_concurrency.max(1),
            mode: NotifyMode::Send,
        }
    }

    pub fn with_mode(mut self, mode: NotifyMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn store(&self) -> &ArticleStore {
        &self.store
    }

    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    /// Run one full cycle.
    pub async fn run(&self) -> SyncReport {
        tracing::info!(
            categories = self.categories.len(),
            mode = ?self.mode,
            "Starting sync cycle"
        );

        // Phase 1: collect + merge
        let mut merged: Vec<(usize, Result<(Vec<Article>, usize), CategoryError>)> =
            stream::iter(self.categories.iter().enumerate())
                .map(|(idx, category)| async move { (idx, self.collect_and_merge(category).await) })
                .buffer_unordered(self.fetch_concurrency)
                .collect()
                .await;
        merged.sort_by_key(|(idx, _)| *idx);

        let mut reports: Vec<CategoryReport> = self
            .categories
            .iter()
            .map(|c| CategoryReport::new(&c.id))
            .collect();
        let mut retained_sets: Vec<Option<Vec<Article>>> = Vec::with_capacity(merged.len());
        let mut valid_ids: HashSet<String> = HashSet::new();
        let mut prune = true;

        for ((idx, result), category) in merged.into_iter().zip(&self.categories) {
            let report = &mut reports[idx];
            match result {
                Ok((articles, feed_failures)) => {
                    report.retained = articles.len();
                    report.feed_failures = feed_failures;
                    valid_ids.extend(articles.iter().map(|a| a.id.clone()));
                    retained_sets.push(Some(articles));
                }
                Err(e) => {
                    tracing::warn!(category = %category.id, error = %e, "Category skipped this cycle");
                    // Its stored articles are still retained; keep their history.
                    match self.store.retained_ids(&category.id).await {
                        Ok(stored) => valid_ids.extend(stored),
                        Err(load_err) => {
                            tracing::warn!(
                                category = %category.id,
                                error = %load_err,
                                "Cannot read stored ids, history will not be pruned"
                            );
                            prune = false;
                        }
                    }
                    report.error = Some(e);
                    retained_sets.push(None);
                }
            }
        }

        // Phase 2: history
        let mut posted = self.history.load().await;
        tracing::debug!(posted = posted.len(), valid = valid_ids.len(), "Loaded post history");

        // Phase 3: announce
        let dispatcher = (self.mode == NotifyMode::Send).then(|| {
            Dispatcher::spawn(
                Arc::clone(&self.notifier),
                self.notify_interval,
                self.notify_timeout,
            )
        });

        for (idx, retained) in retained_sets.iter().enumerate() {
            let Some(retained) = retained else { continue };
            let category = &self.categories[idx];
            let report = &mut reports[idx];
            let unseen = filter_unseen(retained, &posted);
            if unseen.is_empty() {
                continue;
            }

            match self.mode {
                NotifyMode::Skip => report.pending = unseen.len(),
                NotifyMode::SeedHistory => {
                    mark_posted(&mut posted, &unseen);
                    tracing::info!(
                        category = %category.id,
                        seeded = unseen.len(),
                        "Marked articles as posted without sending"
                    );
                }
                NotifyMode::Send => {
                    if let Some(dispatcher) = &dispatcher {
                        let destination = self.destinations[idx].as_ref();
                        self.announce(category, destination, &unseen, dispatcher, &mut posted, report)
                            .await;
                    }
                }
            }
        }

        if let Some(dispatcher) = dispatcher {
            dispatcher.shutdown().await;
        }

        // Phase 4: persist
        let history = if prune {
            self.history.save(&posted, &valid_ids).await
        } else {
            self.history.save_unpruned(&posted).await
        };
        if let Err(e) = &history {
            tracing::error!(error = %e, "Failed to save post history");
        }

        let index = self.store.regenerate_index(&self.categories).await;
        if let Err(e) = &index {
            tracing::error!(error = %e, "Failed to regenerate index");
        }

        let report = SyncReport {
            categories: reports,
            pruned: prune,
            history,
            index,
        };
        tracing::info!(
            sent = report.total_sent(),
            failed = report.failed_categories(),
            "Sync cycle finished"
        );
        report
    }

    /// Fetch every feed of a category and merge the results.
    ///
    /// Returns the retained collection and the number of feeds that failed.
    /// The category fails only when every feed fails (or storage fails).
    async fn collect_and_merge(
        &self,
        category: &Category,
    ) -> Result<(Vec<Article>, usize), CategoryError> {
        let results = futures::future::join_all(
            category.feeds.iter().map(|url| self.collector.collect(url)),
        )
        .await;

        let mut collected = Vec::new();
        let mut failures = Vec::new();
        for (url, result) in category.feeds.iter().zip(results) {
            match result {
                Ok(articles) => collected.extend(articles),
                Err(e) => {
                    tracing::warn!(category = %category.id, feed = %url, error = %e, "Feed fetch failed");
                    failures.push(e);
                }
            }
        }

        let failure_count = failures.len();
        if failure_count > 0 && failure_count == category.feeds.len() {
            if let Some(last) = failures.pop() {
                return Err(CategoryError::AllFeedsFailed {
                    attempted: failure_count,
                    last,
                });
            }
        }

        let retained = self
            .store
            .merge(&category.id, &category.name, collected)
            .await?;
        Ok((retained, failure_count))
    }

    /// Send unseen articles in stored (newest-first) order.
    ///
    /// Stops the category at the first failed send; the rest stay unseen.
    async fn announce(
        &self,
        category: &Category,
        destination: Option<&SecretString>,
        unseen: &[Article],
        dispatcher: &Dispatcher,
        posted: &mut HashSet<String>,
        report: &mut CategoryReport,
    ) {
        let Some(destination) = destination else {
            tracing::warn!(category = %category.id, unseen = unseen.len(), "No webhook configured, leaving articles unseen");
            report.pending = unseen.len();
            report.error = Some(CategoryError::NoDestination);
            return;
        };

        for (position, article) in unseen.iter().enumerate() {
            // A sibling category may have just announced the same id.
            if posted.contains(&article.id) {
                continue;
            }
            match dispatcher.dispatch(destination, article, &category.name).await {
                Ok(()) => {
                    posted.insert(article.id.clone());
                    report.sent += 1;
                }
                Err(e) => {
                    report.pending = filter_unseen(&unseen[position..], posted).len();
                    report.error = Some(CategoryError::Notify(e));
                    break;
                }
            }
        }

        tracing::info!(
            category = %category.id,
            sent = report.sent,
            pending = report.pending,
            "Announced new articles"
        );
    }
}
