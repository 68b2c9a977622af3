//! Offline state: connectivity flag, pending-change queue and last sync time.

use chrono::Utc;
use rand::distr::Alphanumeric;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use uuid::Uuid;

use super::network::NetworkStatus;
use super::pending::{Mutation, PendingChange};
use crate::lock;
use crate::mirror::{LocalMirror, MirrorKey};
use crate::models::RecordId;
use crate::task::BackgroundTask;

const ID_SUFFIX_LEN: usize = 9;

#[derive(Debug, Default)]
struct TrackerState {
    pending: Vec<PendingChange>,
    last_sync: Option<i64>,
}

/// Single source of truth for connectivity and the pending-change queue.
///
/// Every change to the queue or the last sync time is written through to the
/// local mirror. The offline flag follows the connectivity signal given to
/// [`OfflineTracker::observe`] and cannot be set directly.
#[derive(Debug)]
pub struct OfflineTracker {
    mirror: LocalMirror,
    state: Mutex<TrackerState>,
    offline: watch::Sender<bool>,
}

impl OfflineTracker {
    /// Creates a tracker, restoring the queue and last sync time from the mirror.
    pub fn new(mirror: LocalMirror, initial: NetworkStatus) -> Self {
        let pending: Vec<PendingChange> = mirror.get(&MirrorKey::PendingChanges).unwrap_or_default();
        let last_sync: Option<i64> = mirror.get(&MirrorKey::LastSync);
        if !pending.is_empty() {
            tracing::info!("Restored {} pending change(s)", pending.len());
        }

        let (offline, _) = watch::channel(!initial.is_online());
        Self {
            mirror,
            state: Mutex::new(TrackerState { pending, last_sync }),
            offline,
        }
    }

    /// Follow a connectivity signal until the returned task is dropped.
    ///
    /// The current value is applied before this returns.
    pub fn observe(
        self: &Arc<Self>,
        mut signal: watch::Receiver<NetworkStatus>,
    ) -> BackgroundTask {
        let status = *signal.borrow_and_update();
        self.apply_status(status);

        let tracker = Arc::clone(self);
        BackgroundTask::spawn(async move {
            while signal.changed().await.is_ok() {
                let status = *signal.borrow_and_update();
                tracker.apply_status(status);
            }
        })
    }

    fn apply_status(&self, status: NetworkStatus) {
        let offline = !status.is_online();
        let changed = self.offline.send_if_modified(|current| {
            if *current == offline {
                false
            } else {
                *current = offline;
                true
            }
        });
        if changed {
            tracing::info!("Shopping sync is now {}", status);
        }
    }

    pub fn is_offline(&self) -> bool {
        *self.offline.borrow()
    }

    /// Receiver of the offline flag, woken on every transition.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.offline.subscribe()
    }

    /// Queue a mutation, assigning its id and timestamp.
    ///
    /// Timestamps are strictly increasing so that changes queued within the
    /// same millisecond keep their order.
    pub fn add_pending_change(&self, mutation: Mutation, provisional_ids: Vec<Uuid>) -> PendingChange {
        let mut state = lock(&self.state);

        let now = Utc::now().timestamp_millis();
        let timestamp = match state.pending.iter().map(|c| c.timestamp).max() {
            Some(last) if last >= now => last + 1,
            _ => now,
        };
        let change = PendingChange {
            id: generate_change_id(timestamp),
            list_id: mutation.list_id().cloned(),
            mutation,
            timestamp,
            provisional_ids,
            attempts: 0,
        };

        tracing::debug!("Queued {} change {}", change.change_type(), change.id);
        state.pending.push(change.clone());
        self.persist_queue(&state.pending);
        change
    }

    /// Remove a change by id. Unknown ids are ignored.
    pub fn remove_pending_change(&self, id: &str) {
        let mut state = lock(&self.state);
        let before = state.pending.len();
        state.pending.retain(|c| c.id != id);
        if state.pending.len() != before {
            self.persist_queue(&state.pending);
        }
    }

    /// Overwrite a queued change with the same id. Unknown ids are ignored.
    pub fn replace_pending_change(&self, change: PendingChange) {
        let mut state = lock(&self.state);
        if let Some(slot) = state.pending.iter_mut().find(|c| c.id == change.id) {
            *slot = change;
            self.persist_queue(&state.pending);
        }
    }

    /// Rewrite provisional ids in every queued change.
    pub fn resolve_provisional_ids(&self, resolved: &HashMap<Uuid, String>) {
        if resolved.is_empty() {
            return;
        }
        let mut state = lock(&self.state);
        let mut changed = false;
        for change in state.pending.iter_mut() {
            changed |= change.resolve_ids(resolved);
        }
        if changed {
            self.persist_queue(&state.pending);
        }
    }

    /// Drop every queued change.
    pub fn clear_pending_changes(&self) {
        let mut state = lock(&self.state);
        state.pending.clear();
        self.mirror.remove(&MirrorKey::PendingChanges);
        tracing::info!("Cleared pending changes");
    }

    /// Snapshot of the queue in insertion order.
    pub fn pending_changes(&self) -> Vec<PendingChange> {
        lock(&self.state).pending.clone()
    }

    /// Returns true if any change is queued, optionally only for one list.
    pub fn has_pending_changes(&self, list_id: Option<&RecordId>) -> bool {
        self.pending_changes_count(list_id) > 0
    }

    /// Number of queued changes, optionally only for one list.
    pub fn pending_changes_count(&self, list_id: Option<&RecordId>) -> usize {
        let state = lock(&self.state);
        match list_id {
            Some(id) => state.pending.iter().filter(|c| c.targets(id)).count(),
            None => state.pending.len(),
        }
    }

    /// Record now as the last successful sync.
    pub fn update_last_sync(&self) {
        let now = Utc::now().timestamp_millis();
        lock(&self.state).last_sync = Some(now);
        self.mirror.set(&MirrorKey::LastSync, &now);
    }

    /// Epoch millis of the last successful sync.
    pub fn last_sync(&self) -> Option<i64> {
        lock(&self.state).last_sync
    }

    /// Park a change that will not be retried.
    pub fn dead_letter(&self, change: PendingChange) {
        let mut dead = self.dead_letters();
        tracing::warn!(
            "Giving up on {} change {} after {} attempt(s)",
            change.change_type(),
            change.id,
            change.attempts
        );
        dead.push(change);
        self.mirror.set(&MirrorKey::DeadLetter, &dead);
    }

    /// Changes that were given up on.
    pub fn dead_letters(&self) -> Vec<PendingChange> {
        self.mirror.get(&MirrorKey::DeadLetter).unwrap_or_default()
    }

    pub fn clear_dead_letters(&self) {
        self.mirror.remove(&MirrorKey::DeadLetter);
    }

    fn persist_queue(&self, pending: &[PendingChange]) {
        self.mirror.set(&MirrorKey::PendingChanges, &pending);
    }
}

/// Time-based id with a random suffix to avoid same-millisecond collisions.
fn generate_change_id(timestamp: i64) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{}-{}", timestamp, suffix.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::{FileStore, MemoryStore};
    use crate::models::{CreateListRequest, DeleteListRequest, NewItem};
    use crate::models::AddItemsRequest;
    use crate::offline::NetworkMonitor;
    use std::time::Duration;
    use tempfile::TempDir;

    fn memory_tracker(status: NetworkStatus) -> OfflineTracker {
        OfflineTracker::new(LocalMirror::new(Arc::new(MemoryStore::new())), status)
    }

    fn delete(list: &str) -> Mutation {
        Mutation::DeleteList(DeleteListRequest::new(RecordId::server(list)))
    }

    #[test]
    fn test_add_assigns_unique_ids_and_increasing_timestamps() {
        let tracker = memory_tracker(NetworkStatus::Offline);
        let a = tracker.add_pending_change(delete("L1"), Vec::new());
        let b = tracker.add_pending_change(delete("L2"), Vec::new());
        let c = tracker.add_pending_change(delete("L3"), Vec::new());

        assert_ne!(a.id, b.id);
        assert_ne!(b.id, c.id);
        assert!(a.timestamp < b.timestamp);
        assert!(b.timestamp < c.timestamp);
        assert!(a.id.starts_with(&a.timestamp.to_string()));
        assert_eq!(a.list_id, Some(RecordId::server("L1")));
        assert_eq!(tracker.pending_changes().len(), 3);
    }

    #[test]
    fn test_queue_survives_restart() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));

        let tracker = OfflineTracker::new(LocalMirror::new(store.clone()), NetworkStatus::Offline);
        let change = tracker.add_pending_change(
            Mutation::CreateList(CreateListRequest::new("Groceries")),
            vec![Uuid::new_v4()],
        );
        tracker.update_last_sync();
        let last_sync = tracker.last_sync();
        drop(tracker);

        let restored = OfflineTracker::new(LocalMirror::new(store), NetworkStatus::Online);
        assert_eq!(restored.pending_changes(), vec![change]);
        assert_eq!(restored.last_sync(), last_sync);
        assert!(!restored.is_offline());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let tracker = memory_tracker(NetworkStatus::Offline);
        let change = tracker.add_pending_change(delete("L1"), Vec::new());

        tracker.remove_pending_change("does-not-exist");
        assert_eq!(tracker.pending_changes_count(None), 1);

        tracker.remove_pending_change(&change.id);
        tracker.remove_pending_change(&change.id);
        assert_eq!(tracker.pending_changes_count(None), 0);
    }

    #[test]
    fn test_counts_scoped_by_list() {
        let tracker = memory_tracker(NetworkStatus::Offline);
        let l1 = RecordId::server("L1");
        tracker.add_pending_change(
            Mutation::AddItems(AddItemsRequest::new(l1.clone(), vec![NewItem::new("Milk")])),
            vec![Uuid::new_v4()],
        );
        tracker.add_pending_change(delete("L1"), Vec::new());
        tracker.add_pending_change(delete("L2"), Vec::new());
        tracker.add_pending_change(
            Mutation::CreateList(CreateListRequest::new("New")),
            vec![Uuid::new_v4()],
        );

        assert_eq!(tracker.pending_changes_count(None), 4);
        assert_eq!(tracker.pending_changes_count(Some(&l1)), 2);
        assert!(tracker.has_pending_changes(Some(&RecordId::server("L2"))));
        assert!(!tracker.has_pending_changes(Some(&RecordId::server("L3"))));
    }

    #[test]
    fn test_clear_removes_persisted_queue() {
        let store = Arc::new(MemoryStore::new());
        let mirror = LocalMirror::new(store.clone());
        let tracker = OfflineTracker::new(mirror.clone(), NetworkStatus::Offline);
        tracker.add_pending_change(delete("L1"), Vec::new());
        assert!(mirror
            .get::<Vec<PendingChange>>(&MirrorKey::PendingChanges)
            .is_some());

        tracker.clear_pending_changes();
        assert!(!tracker.has_pending_changes(None));
        assert!(mirror
            .get::<Vec<PendingChange>>(&MirrorKey::PendingChanges)
            .is_none());
    }

    #[test]
    fn test_dead_letters() {
        let tracker = memory_tracker(NetworkStatus::Online);
        let change = tracker.add_pending_change(delete("L1"), Vec::new());
        tracker.remove_pending_change(&change.id);
        tracker.dead_letter(change.clone());

        assert_eq!(tracker.dead_letters(), vec![change]);
        tracker.clear_dead_letters();
        assert!(tracker.dead_letters().is_empty());
    }

    #[test]
    fn test_resolve_provisional_ids_persists() {
        let store = Arc::new(MemoryStore::new());
        let tracker = OfflineTracker::new(LocalMirror::new(store.clone()), NetworkStatus::Offline);
        let local = Uuid::new_v4();
        tracker.add_pending_change(
            Mutation::DeleteList(DeleteListRequest::new(RecordId::Local(local))),
            Vec::new(),
        );

        let mut resolved = HashMap::new();
        resolved.insert(local, "srv-1".to_string());
        tracker.resolve_provisional_ids(&resolved);

        let restored = OfflineTracker::new(LocalMirror::new(store), NetworkStatus::Offline);
        assert_eq!(
            restored.pending_changes()[0].list_id,
            Some(RecordId::server("srv-1"))
        );
    }

    #[tokio::test]
    async fn test_observe_follows_connectivity_signal() {
        let tracker = Arc::new(memory_tracker(NetworkStatus::Online));
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);

        let _subscription = tracker.observe(monitor.subscribe());
        assert!(tracker.is_offline());

        let mut offline = tracker.subscribe();
        monitor.report(NetworkStatus::Online);
        tokio::time::timeout(Duration::from_secs(1), offline.wait_for(|o| !*o))
            .await
            .unwrap()
            .unwrap();
        assert!(!tracker.is_offline());
    }

    #[tokio::test]
    async fn test_dropping_subscription_stops_observing() {
        let tracker = Arc::new(memory_tracker(NetworkStatus::Online));
        let monitor = NetworkMonitor::new(NetworkStatus::Online);

        let subscription = tracker.observe(monitor.subscribe());
        drop(subscription);
        tokio::task::yield_now().await;

        monitor.report(NetworkStatus::Offline);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!tracker.is_offline());
    }
}
