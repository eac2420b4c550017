use crate::{
    core::{ConfigHash, Configuration},
    index::{Resolver, SharedStore},
    status,
    throttle,
    watch::Changed,
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tokio::sync::{mpsc, watch};

/// Recomputes the configuration whenever the store changes.
///
/// The driver is the only writer of the published configuration and the only
/// producer of status updates.
pub struct Driver {
    store: SharedStore,
    resolver: Resolver,
    status: status::SharedIndex,
    throttle: Duration,
    published: watch::Sender<Arc<Configuration>>,
    last_hash: Option<ConfigHash>,
}

impl Driver {
    pub fn new(
        store: SharedStore,
        resolver: Resolver,
        status: status::SharedIndex,
        throttle: Duration,
    ) -> (Self, watch::Receiver<Arc<Configuration>>) {
        let (published, rx) = watch::channel(Arc::new(Configuration::default()));
        let driver = Self {
            store,
            resolver,
            status,
            throttle,
            published,
            last_hash: None,
        };
        (driver, rx)
    }

    /// Waits for the store to sync and then reconciles after every batch of
    /// changes until shutdown or until every watch has stopped.
    pub async fn run(mut self, changes: mpsc::Receiver<Changed>, shutdown: drain::Watch) {
        let mut changes = if self.throttle.is_zero() {
            changes
        } else {
            throttle::coalesce(changes)
        };
        let shutdown = shutdown.signaled();
        tokio::pin!(shutdown);

        while !self.store.read().is_synced() {
            tokio::select! {
                changed = changes.recv() => {
                    if changed.is_none() {
                        tracing::debug!("Watches stopped before syncing");
                        return;
                    }
                }
                _ = &mut shutdown => return,
            }
        }
        tracing::info!("Watches synced");
        self.reconcile();

        loop {
            let batch = tokio::select! {
                batch = throttle::next_batch(&mut changes, self.throttle) => batch,
                _ = &mut shutdown => {
                    tracing::debug!("Shutdown");
                    return;
                }
            };
            let Some(batch) = batch else {
                tracing::debug!("Watches stopped");
                return;
            };
            tracing::debug!(changes = batch, "Reconciling");
            self.reconcile();
        }
    }

    /// Resolves the current store, queues status updates and publishes the
    /// configuration if its content changed.
    fn reconcile(&mut self) {
        let now = Utc::now();
        let configuration = {
            let store = self.store.read();
            let resolution = self.resolver.resolve(&store, now);
            self.status.write().reconcile(&resolution, &store, now);
            resolution.configuration
        };

        let hash = match configuration.hash() {
            Ok(hash) => hash,
            Err(error) => {
                tracing::error!(%error, "Failed to hash configuration");
                return;
            }
        };
        if self.last_hash.as_ref() == Some(&hash) {
            tracing::debug!(%hash, "Configuration unchanged");
            return;
        }

        tracing::info!(
            %hash,
            http.routers = configuration.http.routers.len(),
            tcp.routers = configuration.tcp.routers.len(),
            udp.routers = configuration.udp.routers.len(),
            "Publishing configuration"
        );
        self.last_hash = Some(hash);
        self.published.send_replace(Arc::new(configuration));
    }
}
