//! Outbound announcements of new articles.
//!
//! - [`Notifier`] - the transport seam; one call announces one article
//! - [`discord`] - Discord webhook embeds
//! - [`dispatch`] - single-worker queue enforcing one send in flight and a
//!   fixed gap between sends, across every category

mod discord;
mod dispatch;

use async_trait::async_trait;
use secrecy::SecretString;
use std::time::Duration;
use thiserror::Error;

use crate::storage::Article;

pub use discord::DiscordNotifier;
pub use dispatch::Dispatcher;

/// Errors returned by a notification transport.
///
/// Every variant is recoverable: the article stays unseen and is offered
/// again on the next run.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("HTTP error: status {0}")]
    HttpStatus(u16),

    #[error("Notification timed out after {0:?}")]
    Timeout(Duration),

    /// The sink asked us to back off (HTTP 429).
    #[error("Rate limited by notification sink (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The dispatch worker is gone; nothing more can be sent this run.
    #[error("Notification dispatcher is closed")]
    DispatcherClosed,
}

/// A sink that announces one article at a time.
///
/// Callers are responsible for pacing; implementations send immediately.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        destination: &SecretString,
        article: &Article,
        category: &str,
    ) -> Result<(), NotifyError>;
}
