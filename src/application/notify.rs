//! Bridges the remote change feed to store reloads.

use std::sync::Arc;

use metrics::counter;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::application::repos::{ChangeFeed, ChangeSubscription, RepoError};
use crate::application::store::PostStore;

pub(crate) const METRIC_REALTIME_EVENTS_TOTAL: &str = "defter_realtime_events_total";

/// Reloads the store once per delivered change event.
///
/// The subscription is released when the bridge is detached or dropped,
/// whichever comes first.
pub struct ChangeBridge {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    running: watch::Receiver<()>,
}

impl ChangeBridge {
    pub async fn attach(store: Arc<PostStore>, feed: &dyn ChangeFeed) -> Result<Self, RepoError> {
        let subscription = feed.subscribe().await?;
        let (shutdown, stop) = oneshot::channel();
        let (alive, running) = watch::channel(());
        let task = tokio::spawn(forward_changes(store, subscription, stop, alive));
        info!("Change bridge attached");

        Ok(Self {
            shutdown: Some(shutdown),
            task: Some(task),
            running,
        })
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Resolves once the bridge has stopped forwarding, for any reason.
    pub async fn closed(&self) {
        let mut running = self.running.clone();
        while running.changed().await.is_ok() {}
    }

    /// Stop forwarding and wait for the subscription to be released.
    ///
    /// A reload already in progress is allowed to finish.
    pub async fn detach(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
            && err.is_panic()
        {
            warn!(error = %err, "Change bridge task panicked");
        }
        info!("Change bridge detached");
    }
}

impl Drop for ChangeBridge {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn forward_changes(
    store: Arc<PostStore>,
    mut subscription: ChangeSubscription,
    mut stop: oneshot::Receiver<()>,
    _alive: watch::Sender<()>,
) {
    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = subscription.next() => {
                let Some(event) = event else {
                    warn!("Change feed closed by remote");
                    break;
                };
                counter!(METRIC_REALTIME_EVENTS_TOTAL).increment(1);
                debug!(kind = ?event.kind, "Change notification received");
                if let Err(err) = store.load_all().await {
                    warn!(error = %err, "Reload after change notification failed");
                }
            }
        }
    }
}
