//! The shopping sync service.
//!
//! [`ShoppingSync`] wires the tracker, cache, mirror, dispatcher, queries and
//! reconciler together. Build one in the composition root and hand out
//! references; connectivity and reconnect handling last as long as the
//! handles returned by [`ShoppingSync::observe`] and
//! [`ShoppingSync::watch_reconnects`].

use std::sync::Arc;
use std::time::Duration;

use crate::cache::{QueryCache, SharedCache, DEFAULT_STALE_TIME};
use crate::dispatcher::MutationDispatcher;
use crate::mirror::{KeyValueStore, LocalMirror};
use crate::models::RecordId;
use crate::notify::{Notifier, TracingNotifier};
use crate::offline::{
    ConnectivitySubscription, NetworkMonitor, NetworkStatus, OfflineTracker, PendingChange,
};
use crate::queries::ShoppingQueries;
use crate::reconciler::{Reconciler, SyncReport, DEFAULT_RECONNECT_DELAY};
use crate::remote::ShoppingRemote;
use crate::task::BackgroundTask;

/// Tunables for [`ShoppingSync`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// How long an online read stays fresh
    pub stale_time: Duration,
    /// Wait after reconnecting before replaying the queue
    pub reconnect_delay: Duration,
    /// Failed replays before a change is dead-lettered; `None` retries forever
    pub max_attempts: Option<u32>,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            stale_time: DEFAULT_STALE_TIME,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            max_attempts: None,
        }
    }
}

pub struct ShoppingSyncBuilder {
    remote: Arc<dyn ShoppingRemote>,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    options: SyncOptions,
}

impl ShoppingSyncBuilder {
    /// Where notifications go. Defaults to the log.
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn options(mut self, options: SyncOptions) -> Self {
        self.options = options;
        self
    }

    /// Build the service, restoring queued changes from the store.
    pub fn build(self, initial: NetworkStatus) -> ShoppingSync {
        let mirror = LocalMirror::new(self.store);
        let tracker = Arc::new(OfflineTracker::new(mirror.clone(), initial));
        let cache = QueryCache::shared(self.options.stale_time);

        let dispatcher = MutationDispatcher::new(
            self.remote.clone(),
            tracker.clone(),
            cache.clone(),
            mirror.clone(),
            self.notifier.clone(),
        );
        let queries = ShoppingQueries::new(
            self.remote.clone(),
            tracker.clone(),
            cache.clone(),
            mirror.clone(),
        );
        let reconciler = Arc::new(
            Reconciler::new(self.remote, tracker.clone(), cache.clone(), mirror, self.notifier)
                .with_max_attempts(self.options.max_attempts),
        );

        ShoppingSync {
            tracker,
            cache,
            dispatcher,
            queries,
            reconciler,
            options: self.options,
        }
    }
}

pub struct ShoppingSync {
    tracker: Arc<OfflineTracker>,
    cache: SharedCache,
    dispatcher: MutationDispatcher,
    queries: ShoppingQueries,
    reconciler: Arc<Reconciler>,
    options: SyncOptions,
}

impl ShoppingSync {
    pub fn builder(
        remote: Arc<dyn ShoppingRemote>,
        store: Arc<dyn KeyValueStore>,
    ) -> ShoppingSyncBuilder {
        ShoppingSyncBuilder {
            remote,
            store,
            notifier: Arc::new(TracingNotifier),
            options: SyncOptions::default(),
        }
    }

    pub fn dispatcher(&self) -> &MutationDispatcher {
        &self.dispatcher
    }

    pub fn queries(&self) -> &ShoppingQueries {
        &self.queries
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn tracker(&self) -> &Arc<OfflineTracker> {
        &self.tracker
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    pub fn is_offline(&self) -> bool {
        self.tracker.is_offline()
    }

    pub fn has_pending_changes(&self, list_id: Option<&RecordId>) -> bool {
        self.tracker.has_pending_changes(list_id)
    }

    pub fn pending_changes_count(&self, list_id: Option<&RecordId>) -> usize {
        self.tracker.pending_changes_count(list_id)
    }

    pub fn pending_changes(&self) -> Vec<PendingChange> {
        self.tracker.pending_changes()
    }

    /// Epoch millis of the last pass that replayed at least one change.
    pub fn last_sync(&self) -> Option<i64> {
        self.tracker.last_sync()
    }

    /// Follow the monitor's connectivity signal.
    pub fn observe(&self, network: &NetworkMonitor) -> ConnectivitySubscription {
        self.tracker.observe(network.subscribe())
    }

    /// Replay the queue after each reconnect, waiting the configured delay.
    pub fn watch_reconnects(&self) -> BackgroundTask {
        self.reconciler
            .watch_reconnects(self.options.reconnect_delay)
    }

    /// Replay the queue now.
    pub async fn sync_now(&self) -> SyncReport {
        self.reconciler.reconcile().await
    }
}
