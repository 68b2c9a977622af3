//! Replays the pending-change queue against the remote store.
//!
//! A pass replays every queued change in timestamp order. A change that
//! succeeds is removed from the queue right away, so an interrupted pass never
//! resubmits it. A change that fails stays queued for the next pass, unless a
//! retry limit is configured and reached, in which case it is moved to the
//! dead-letter bucket. Failures never stop the pass.
//!
//! When a replayed change created records, the server ids it returned replace
//! the provisional ids in the rest of the queue and in the local mirror.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cache::SharedCache;
use crate::lock;
use crate::mirror::{LocalMirror, MirrorKey};
use crate::models::{resolve_id, RecordId, ShoppingList, ShoppingListDetail};
use crate::notify::{Notification, Notifier};
use crate::offline::{Mutation, OfflineTracker};
use crate::remote::{RemoteError, ShoppingRemote};
use crate::task::BackgroundTask;

/// Default wait between coming back online and starting a pass.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl SyncReport {
    /// Returns true if the pass had nothing to replay.
    pub fn is_empty(&self) -> bool {
        self.synced == 0 && self.failed == 0 && self.dead_lettered == 0
    }
}

/// Send one queued mutation to the remote store.
///
/// Returns the server ids of the records it created, in payload order.
pub async fn replay(
    remote: &dyn ShoppingRemote,
    mutation: &Mutation,
) -> Result<Vec<String>, RemoteError> {
    match mutation {
        Mutation::CreateList(request) => {
            let list = remote.create_list(request).await?;
            Ok(list.id.as_server().map(str::to_string).into_iter().collect())
        }
        Mutation::AddItems(request) => {
            let items = remote.add_items(request).await?;
            Ok(items
                .iter()
                .filter_map(|item| item.id.as_server().map(str::to_string))
                .collect())
        }
        Mutation::UpdateItem(request) => {
            remote.update_item(request).await?;
            Ok(Vec::new())
        }
        Mutation::DeleteList(request) => {
            remote.delete_list(request).await?;
            Ok(Vec::new())
        }
    }
}

pub struct Reconciler {
    remote: Arc<dyn ShoppingRemote>,
    tracker: Arc<OfflineTracker>,
    cache: SharedCache,
    mirror: LocalMirror,
    notifier: Arc<dyn Notifier>,
    max_attempts: Option<u32>,
    pass: tokio::sync::Mutex<()>,
}

impl Reconciler {
    pub fn new(
        remote: Arc<dyn ShoppingRemote>,
        tracker: Arc<OfflineTracker>,
        cache: SharedCache,
        mirror: LocalMirror,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            remote,
            tracker,
            cache,
            mirror,
            notifier,
            max_attempts: None,
            pass: tokio::sync::Mutex::new(()),
        }
    }

    /// Give up on a change after this many failed replays.
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.filter(|max| *max > 0);
        self
    }

    /// Run one pass over the queue. Only one pass runs at a time.
    pub async fn reconcile(&self) -> SyncReport {
        let _pass = self.pass.lock().await;

        let mut queue = self.tracker.pending_changes();
        if queue.is_empty() {
            return SyncReport::default();
        }
        queue.sort_by_key(|change| change.timestamp);

        tracing::info!("Replaying {} pending change(s)", queue.len());
        self.notifier.notify(Notification::info(format!(
            "Syncing {} change(s)…",
            queue.len()
        )));

        let mut report = SyncReport::default();
        let mut resolved: HashMap<Uuid, String> = HashMap::new();

        for mut change in queue {
            change.resolve_ids(&resolved);
            tracing::debug!("Replaying {} change {}", change.change_type(), change.id);

            match replay(self.remote.as_ref(), &change.mutation).await {
                Ok(server_ids) => {
                    self.tracker.remove_pending_change(&change.id);
                    report.synced += 1;

                    let assigned: HashMap<Uuid, String> = change
                        .provisional_ids
                        .iter()
                        .copied()
                        .zip(server_ids)
                        .collect();
                    if !assigned.is_empty() {
                        self.tracker.resolve_provisional_ids(&assigned);
                        self.remap_mirror(&assigned, change.list_id.as_ref());
                        resolved.extend(assigned);
                    }
                }
                Err(e) => {
                    change.attempts += 1;
                    tracing::warn!(
                        "Failed to replay {} change {} (attempt {}): {}",
                        change.change_type(),
                        change.id,
                        change.attempts,
                        e
                    );

                    let exhausted = self
                        .max_attempts
                        .is_some_and(|max| change.attempts >= max);
                    if exhausted {
                        self.tracker.remove_pending_change(&change.id);
                        self.tracker.dead_letter(change);
                        report.dead_lettered += 1;
                    } else {
                        self.tracker.replace_pending_change(change);
                        report.failed += 1;
                    }
                }
            }
        }

        if report.synced > 0 {
            self.tracker.update_last_sync();
            lock(&self.cache).invalidate_all();
            self.notifier.notify(Notification::success(format!(
                "Synced {} change(s)",
                report.synced
            )));
        }
        if report.failed > 0 {
            self.notifier.notify(Notification::error(format!(
                "Failed to sync {} change(s)",
                report.failed
            )));
        }
        if report.dead_lettered > 0 {
            self.notifier.notify(Notification::error(format!(
                "Gave up on {} change(s)",
                report.dead_lettered
            )));
        }

        tracing::info!(
            "Sync pass finished: {} synced, {} failed, {} given up",
            report.synced,
            report.failed,
            report.dead_lettered
        );
        report
    }

    /// Start a pass shortly after every offline-to-online transition.
    ///
    /// Nothing happens if the queue is empty or connectivity drops again
    /// during the delay. The watcher stops when the returned task is dropped.
    pub fn watch_reconnects(self: &Arc<Self>, delay: Duration) -> BackgroundTask {
        let mut offline = self.tracker.subscribe();
        let reconciler = Arc::clone(self);

        BackgroundTask::spawn(async move {
            let mut was_offline = *offline.borrow_and_update();
            while offline.changed().await.is_ok() {
                let is_offline = *offline.borrow_and_update();
                let reconnected = was_offline && !is_offline;
                was_offline = is_offline;
                if !reconnected || !reconciler.tracker.has_pending_changes(None) {
                    continue;
                }

                tracing::info!("Back online, syncing in {:?}", delay);
                tokio::time::sleep(delay).await;

                was_offline = *offline.borrow_and_update();
                if was_offline {
                    tracing::debug!("Went offline again before syncing");
                    continue;
                }
                reconciler.reconcile().await;
            }
        })
    }

    /// Rewrite provisional ids in the mirrored snapshots.
    ///
    /// `target` is the list the replayed change belongs to. Its detail is
    /// remapped even when the list is missing from the stored collection.
    fn remap_mirror(&self, assigned: &HashMap<Uuid, String>, target: Option<&RecordId>) {
        let lists: Option<Vec<ShoppingList>> = self.mirror.get(&MirrorKey::ShoppingLists);
        if let Some(mut lists) = lists {
            let mut changed = false;
            for list in lists.iter_mut() {
                changed |= resolve_id(&mut list.id, assigned);
            }
            if changed {
                self.mirror.set(&MirrorKey::ShoppingLists, &lists);
            }
        }

        for (local, server) in assigned {
            let old_key = MirrorKey::ListDetail(RecordId::Local(*local));
            let Some(mut detail) = self.mirror.get::<ShoppingListDetail>(&old_key) else {
                continue;
            };
            resolve_id(&mut detail.list.id, assigned);
            for item in detail.items.iter_mut() {
                resolve_id(&mut item.id, assigned);
                resolve_id(&mut item.list_id, assigned);
            }
            self.mirror
                .set(&MirrorKey::ListDetail(RecordId::server(server.clone())), &detail);
            self.mirror.remove(&old_key);
        }

        // Items added offline to lists that already had server ids
        let mut details: Vec<RecordId> = self
            .mirror
            .get::<Vec<ShoppingList>>(&MirrorKey::ShoppingLists)
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.id)
            .collect();
        if let Some(target) = target {
            if !details.contains(target) {
                details.push(target.clone());
            }
        }
        for list_id in details {
            let key = MirrorKey::ListDetail(list_id);
            let Some(mut detail) = self.mirror.get::<ShoppingListDetail>(&key) else {
                continue;
            };
            let mut changed = false;
            for item in detail.items.iter_mut() {
                changed |= resolve_id(&mut item.id, assigned);
            }
            if changed {
                self.mirror.set(&key, &detail);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{QueryCache, DEFAULT_STALE_TIME};
    use crate::dispatcher::MutationDispatcher;
    use crate::mirror::MemoryStore;
    use crate::models::{
        AddItemsRequest, CreateListRequest, DeleteListRequest, ItemChanges, NewItem,
        UpdateItemRequest,
    };
    use crate::notify::{CollectingNotifier, NotificationLevel};
    use crate::offline::{NetworkMonitor, NetworkStatus};
    use crate::remote::{InMemoryRemote, RemoteCall};

    struct Harness {
        remote: Arc<InMemoryRemote>,
        tracker: Arc<OfflineTracker>,
        cache: SharedCache,
        mirror: LocalMirror,
        notifier: Arc<CollectingNotifier>,
        dispatcher: MutationDispatcher,
        reconciler: Arc<Reconciler>,
    }

    fn setup(max_attempts: Option<u32>) -> Harness {
        let remote = Arc::new(InMemoryRemote::new());
        let mirror = LocalMirror::new(Arc::new(MemoryStore::new()));
        let tracker = Arc::new(OfflineTracker::new(mirror.clone(), NetworkStatus::Offline));
        let cache = QueryCache::shared(DEFAULT_STALE_TIME);
        let notifier = Arc::new(CollectingNotifier::new());
        let dispatcher = MutationDispatcher::new(
            remote.clone(),
            tracker.clone(),
            cache.clone(),
            mirror.clone(),
            notifier.clone(),
        );
        let reconciler = Arc::new(
            Reconciler::new(
                remote.clone(),
                tracker.clone(),
                cache.clone(),
                mirror.clone(),
                notifier.clone(),
            )
            .with_max_attempts(max_attempts),
        );
        Harness {
            remote,
            tracker,
            cache,
            mirror,
            notifier,
            dispatcher,
            reconciler,
        }
    }

    fn done(done: bool) -> ItemChanges {
        ItemChanges {
            is_completed: Some(done),
            ..Default::default()
        }
    }

    fn summaries(notifier: &CollectingNotifier) -> Vec<(NotificationLevel, String)> {
        notifier
            .take()
            .into_iter()
            .filter(|n| !n.message.starts_with("Saved offline"))
            .map(|n| (n.level, n.message))
            .collect()
    }

    #[tokio::test]
    async fn test_empty_queue_is_silent() {
        let h = setup(None);
        let report = h.reconciler.reconcile().await;
        assert!(report.is_empty());
        assert!(h.notifier.notifications().is_empty());
        assert!(h.tracker.last_sync().is_none());
    }

    #[tokio::test]
    async fn test_replays_updates_in_timestamp_order() {
        let h = setup(None);
        let list = h.remote.seed_list("Groceries");
        let milk = h.remote.seed_item(&list.id, NewItem::new("Milk"));

        let first = h
            .dispatcher
            .update_item(UpdateItemRequest::new(list.id.clone(), milk.id.clone(), done(true)))
            .await
            .unwrap();
        let second = h
            .dispatcher
            .update_item(UpdateItemRequest::new(list.id.clone(), milk.id.clone(), done(false)))
            .await
            .unwrap();
        let (first, second) = (
            first.pending().cloned().unwrap(),
            second.pending().cloned().unwrap(),
        );
        assert!(first.timestamp < second.timestamp);

        // Store the queue out of order; replay must still follow timestamps
        h.tracker.clear_pending_changes();
        h.mirror
            .set(&MirrorKey::PendingChanges, &vec![second.clone(), first.clone()]);
        let tracker = Arc::new(OfflineTracker::new(h.mirror.clone(), NetworkStatus::Online));
        let reconciler = Reconciler::new(
            h.remote.clone(),
            tracker.clone(),
            h.cache.clone(),
            h.mirror.clone(),
            h.notifier.clone(),
        );

        let report = reconciler.reconcile().await;

        assert_eq!(report.synced, 2);
        let updates: Vec<ItemChanges> = h
            .remote
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                RemoteCall::UpdateItem(req) => Some(req.changes),
                _ => None,
            })
            .collect();
        assert_eq!(updates, vec![done(true), done(false)]);
        assert!(!h.remote.stored_items(&list.id)[0].is_completed);
        assert!(!tracker.has_pending_changes(None));
    }

    #[tokio::test]
    async fn test_partial_failure_keeps_only_failed_change() {
        let h = setup(None);
        let a = h.remote.seed_list("A");
        let b = h.remote.seed_list("B");
        let c = h.remote.seed_list("C");
        for list in [&a, &b, &c] {
            h.dispatcher
                .delete_list(DeleteListRequest::new(list.id.clone()))
                .await
                .unwrap();
        }
        let failing = b.id.clone();
        h.remote.fail_when(move |call| {
            matches!(call, RemoteCall::DeleteList(req) if req.list_id == failing)
        });
        lock(&h.cache).set_lists(Vec::new());
        h.notifier.take();

        let report = h.reconciler.reconcile().await;

        assert_eq!(
            report,
            SyncReport {
                synced: 2,
                failed: 1,
                dead_lettered: 0
            }
        );
        let remaining = h.tracker.pending_changes();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].list_id, Some(b.id.clone()));
        assert_eq!(remaining[0].attempts, 1);
        assert!(h.tracker.last_sync().is_some());
        assert!(lock(&h.cache).lists().is_none());

        assert_eq!(
            summaries(&h.notifier),
            vec![
                (NotificationLevel::Info, "Syncing 3 change(s)…".to_string()),
                (NotificationLevel::Success, "Synced 2 change(s)".to_string()),
                (NotificationLevel::Error, "Failed to sync 1 change(s)".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_change_is_retried_and_removed_once() {
        let h = setup(None);
        let list = h.remote.seed_list("Groceries");
        h.dispatcher
            .add_items(AddItemsRequest::new(list.id.clone(), vec![NewItem::new("Milk")]))
            .await
            .unwrap();

        h.remote.set_available(false);
        let report = h.reconciler.reconcile().await;
        assert_eq!(report.failed, 1);
        assert_eq!(h.tracker.pending_changes_count(None), 1);
        assert!(h.tracker.last_sync().is_none());

        h.remote.set_available(true);
        let report = h.reconciler.reconcile().await;
        assert_eq!(report.synced, 1);
        assert!(!h.tracker.has_pending_changes(None));

        let report = h.reconciler.reconcile().await;
        assert!(report.is_empty());
        assert_eq!(h.remote.stored_items(&list.id).len(), 1);
    }

    #[tokio::test]
    async fn test_provisional_ids_are_remapped_during_replay() {
        let h = setup(None);
        let created = h
            .dispatcher
            .create_list(CreateListRequest::new("Party"))
            .await
            .unwrap();
        let local_list = RecordId::Local(created.pending().unwrap().provisional_ids[0]);

        let added = h
            .dispatcher
            .add_items(AddItemsRequest::new(local_list.clone(), vec![NewItem::new("Chips")]))
            .await
            .unwrap();
        let local_item = RecordId::Local(added.pending().unwrap().provisional_ids[0]);

        h.dispatcher
            .update_item(UpdateItemRequest::new(
                local_list.clone(),
                local_item.clone(),
                done(true),
            ))
            .await
            .unwrap();

        let report = h.reconciler.reconcile().await;
        assert_eq!(report.synced, 3);
        assert!(!h.tracker.has_pending_changes(None));

        let server_lists = h.remote.fetch_lists().await.unwrap();
        assert_eq!(server_lists.len(), 1);
        let server_list = &server_lists[0];
        assert_eq!(server_list.name, "Party");
        assert_eq!(server_list.item_count, 1);
        assert_eq!(server_list.completed_count, 1);

        // The mirror now points at the server ids
        let lists: Vec<ShoppingList> = h.mirror.get(&MirrorKey::ShoppingLists).unwrap();
        assert_eq!(lists[0].id, server_list.id);
        assert!(h
            .mirror
            .get::<ShoppingListDetail>(&MirrorKey::ListDetail(local_list))
            .is_none());
        let detail: ShoppingListDetail = h
            .mirror
            .get(&MirrorKey::ListDetail(server_list.id.clone()))
            .unwrap();
        assert!(!detail.items[0].id.is_local());
    }

    #[tokio::test]
    async fn test_item_ids_remapped_when_only_detail_is_stored() {
        let h = setup(None);
        let list = h.remote.seed_list("Groceries");
        // The list was opened but the collection was never loaded
        h.mirror.set(
            &MirrorKey::ListDetail(list.id.clone()),
            &ShoppingListDetail::from_list(list.clone()),
        );
        assert!(h
            .mirror
            .get::<Vec<ShoppingList>>(&MirrorKey::ShoppingLists)
            .is_none());

        h.dispatcher
            .add_items(AddItemsRequest::new(list.id.clone(), vec![NewItem::new("Milk")]))
            .await
            .unwrap();
        assert_eq!(h.reconciler.reconcile().await.synced, 1);

        let server_item = h.remote.stored_items(&list.id)[0].id.clone();
        let detail: ShoppingListDetail = h
            .mirror
            .get(&MirrorKey::ListDetail(list.id.clone()))
            .unwrap();
        assert_eq!(detail.items[0].id, server_item);

        // Offline again, the item is edited through the id the mirror shows
        h.dispatcher
            .update_item(UpdateItemRequest::new(
                list.id.clone(),
                detail.items[0].id.clone(),
                done(true),
            ))
            .await
            .unwrap();
        let report = h.reconciler.reconcile().await;
        assert_eq!(report.synced, 1);
        assert_eq!(report.failed, 0);
        assert!(h.remote.stored_items(&list.id)[0].is_completed);
    }

    #[tokio::test]
    async fn test_dependent_change_waits_for_its_list() {
        let h = setup(None);
        let created = h
            .dispatcher
            .create_list(CreateListRequest::new("Party"))
            .await
            .unwrap();
        let local_list = RecordId::Local(created.pending().unwrap().provisional_ids[0]);
        h.dispatcher
            .add_items(AddItemsRequest::new(local_list.clone(), vec![NewItem::new("Chips")]))
            .await
            .unwrap();

        h.remote
            .fail_when(|call| matches!(call, RemoteCall::CreateList(_)));
        let report = h.reconciler.reconcile().await;
        assert_eq!(report.failed, 2);
        assert_eq!(h.tracker.pending_changes_count(Some(&local_list)), 1);

        h.remote.clear_failures();
        let report = h.reconciler.reconcile().await;
        assert_eq!(report.synced, 2);
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_attempts() {
        let h = setup(Some(2));
        h.dispatcher
            .delete_list(DeleteListRequest::new(RecordId::server("gone")))
            .await
            .unwrap();

        let report = h.reconciler.reconcile().await;
        assert_eq!(report.failed, 1);
        assert!(h.tracker.dead_letters().is_empty());

        h.notifier.take();
        let report = h.reconciler.reconcile().await;
        assert_eq!(
            report,
            SyncReport {
                synced: 0,
                failed: 0,
                dead_lettered: 1
            }
        );
        assert!(!h.tracker.has_pending_changes(None));
        let dead = h.tracker.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(
            summaries(&h.notifier).last().unwrap().1,
            "Gave up on 1 change(s)"
        );
    }

    #[tokio::test]
    async fn test_reconnect_triggers_pass_after_delay() {
        let h = setup(None);
        let list = h.remote.seed_list("Groceries");
        h.dispatcher
            .add_items(AddItemsRequest::new(list.id.clone(), vec![NewItem::new("Milk")]))
            .await
            .unwrap();

        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let _connectivity = h.tracker.observe(monitor.subscribe());
        let _watcher = h.reconciler.watch_reconnects(Duration::from_millis(50));

        monitor.report(NetworkStatus::Online);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(h.tracker.has_pending_changes(None));

        tokio::time::timeout(Duration::from_secs(2), async {
            while h.tracker.has_pending_changes(None) {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(h.remote.stored_items(&list.id).len(), 1);
    }

    #[tokio::test]
    async fn test_no_pass_if_offline_again_before_delay() {
        let h = setup(None);
        h.dispatcher
            .delete_list(DeleteListRequest::new(RecordId::server("L1")))
            .await
            .unwrap();

        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let _connectivity = h.tracker.observe(monitor.subscribe());
        let _watcher = h.reconciler.watch_reconnects(Duration::from_millis(100));

        monitor.report(NetworkStatus::Online);
        tokio::time::sleep(Duration::from_millis(20)).await;
        monitor.report(NetworkStatus::Offline);
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(h.remote.calls().is_empty());
        assert!(h.tracker.has_pending_changes(None));
    }
}
