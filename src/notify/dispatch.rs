use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{Notifier, NotifyError};
use crate::storage::Article;

/// Queue depth; senders wait for their reply anyway, so this only absorbs bursts.
const QUEUE_CAPACITY: usize = 32;

struct DispatchJob {
    destination: SecretString,
    article: Article,
    category: String,
    reply: oneshot::Sender<Result<(), NotifyError>>,
}

/// Rate-limited front for a [`Notifier`].
///
/// A single worker task drains jobs one at a time: exactly one notification
/// is in flight, and each send is followed by at least `interval` before the
/// next one starts, whichever category it belongs to. Every send is bounded by
/// `timeout`.
pub struct Dispatcher {
    tx: mpsc::Sender<DispatchJob>,
    worker: JoinHandle<()>,
}

impl Dispatcher {
    pub fn spawn(notifier: Arc<dyn Notifier>, interval: Duration, timeout: Duration) -> Self {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let worker = tokio::spawn(run_worker(notifier, rx, interval, timeout));
        Self { tx, worker }
    }

    /// Queue one article and wait for the worker's result.
    pub async fn dispatch(
        &self,
        destination: &SecretString,
        article: &Article,
        category: &str,
    ) -> Result<(), NotifyError> {
        let (reply, response) = oneshot::channel();
        let job = DispatchJob {
            destination: SecretString::from(destination.expose_secret().to_owned()),
            article: article.clone(),
            category: category.to_string(),
            reply,
        };

        self.tx
            .send(job)
            .await
            .map_err(|_| NotifyError::DispatcherClosed)?;
        response.await.map_err(|_| NotifyError::DispatcherClosed)?
    }

    /// Close the queue and wait for the worker to finish pending jobs.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            tracing::warn!(error = %e, "Notification worker ended abnormally");
        }
    }
}

async fn run_worker(
    notifier: Arc<dyn Notifier>,
    mut rx: mpsc::Receiver<DispatchJob>,
    interval: Duration,
    timeout: Duration,
) {
    let mut next_allowed: Option<Instant> = None;

    while let Some(job) = rx.recv().await {
        if let Some(at) = next_allowed {
            tokio::time::sleep_until(at).await;
        }

        let result = tokio::time::timeout(
            timeout,
            notifier.notify(&job.destination, &job.article, &job.category),
        )
        .await
        .unwrap_or(Err(NotifyError::Timeout(timeout)));

        if let Err(e) = &result {
            tracing::warn!(
                article = %job.article.id,
                category = %job.category,
                error = %e,
                "Notification failed"
            );
        }

        next_allowed = Some(Instant::now() + interval);

        // The caller may have given up waiting; nothing to do then.
        let _ = job.reply.send(result);
    }

    tracing::debug!("Notification worker stopped");
}
