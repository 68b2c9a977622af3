//! Routes shopping mutations to the remote store or the offline queue.
//!
//! Online, a mutation goes straight to the server and the affected cache
//! entries are invalidated. Offline, the exact payload is queued as a
//! [`PendingChange`] and an optimistic patch is applied to both the query
//! cache and the local mirror, so reads show the change right away and after
//! a restart.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::{QueryKey, SharedCache};
use crate::lock;
use crate::mirror::{LocalMirror, MirrorKey};
use crate::models::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, RecordId, ShoppingItem, ShoppingList,
    ShoppingListDetail, UpdateItemRequest,
};
use crate::notify::{Notification, Notifier};
use crate::offline::{Mutation, OfflineTracker, PendingChange};
use crate::optimistic::{
    apply_add_items, apply_create_list, apply_delete_list, apply_item_count_delta,
    apply_update_item,
};
use crate::remote::{RemoteError, ShoppingRemote};

const QUEUED_MESSAGE: &str = "Saved offline. Changes will sync when you are back online.";

/// Result of a mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    /// The server applied the mutation and returned this
    Applied(T),
    /// The mutation was queued for replay
    Queued(PendingChange),
}

impl<T> MutationOutcome<T> {
    pub fn is_queued(&self) -> bool {
        matches!(self, MutationOutcome::Queued(_))
    }

    pub fn applied(&self) -> Option<&T> {
        match self {
            MutationOutcome::Applied(value) => Some(value),
            MutationOutcome::Queued(_) => None,
        }
    }

    pub fn pending(&self) -> Option<&PendingChange> {
        match self {
            MutationOutcome::Applied(_) => None,
            MutationOutcome::Queued(change) => Some(change),
        }
    }
}

pub struct MutationDispatcher {
    remote: Arc<dyn ShoppingRemote>,
    tracker: Arc<OfflineTracker>,
    cache: SharedCache,
    mirror: LocalMirror,
    notifier: Arc<dyn Notifier>,
}

impl MutationDispatcher {
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
        }
    }

    pub async fn create_list(
        &self,
        request: CreateListRequest,
    ) -> Result<MutationOutcome<ShoppingList>, RemoteError> {
        if !self.tracker.is_offline() {
            let result = self.remote.create_list(&request).await;
            return self.finish_remote(
                result,
                &[QueryKey::Lists],
                "create list",
                |list| format!("Created list {}", list.name),
            );
        }

        let local_id = Uuid::new_v4();
        let now = Utc::now();
        let change = self
            .tracker
            .add_pending_change(Mutation::CreateList(request.clone()), vec![local_id]);
        let insert = |lists: Vec<ShoppingList>| apply_create_list(lists, &request, local_id, now);
        lock(&self.cache).patch_lists(insert);
        // The new list is the one collection entry that may start a snapshot
        let lists: Vec<ShoppingList> = self
            .mirror
            .get(&MirrorKey::ShoppingLists)
            .unwrap_or_default();
        self.mirror.set(&MirrorKey::ShoppingLists, &insert(lists));
        Ok(self.queued(change))
    }

    pub async fn add_items(
        &self,
        request: AddItemsRequest,
    ) -> Result<MutationOutcome<Vec<ShoppingItem>>, RemoteError> {
        if !self.tracker.is_offline() {
            let result = self.remote.add_items(&request).await;
            return self.finish_remote(
                result,
                &[
                    QueryKey::Lists,
                    QueryKey::ListDetail(request.list_id.clone()),
                ],
                "add items",
                |items| format!("Added {} item(s)", items.len()),
            );
        }

        let local_ids: Vec<Uuid> = request.items.iter().map(|_| Uuid::new_v4()).collect();
        let now = Utc::now();
        let change = self
            .tracker
            .add_pending_change(Mutation::AddItems(request.clone()), local_ids.clone());

        self.patch_detail(&request.list_id, |detail| {
            apply_add_items(detail, &request, &local_ids, now)
        });
        let added = request.items.len() as i64;
        self.patch_lists(|lists| apply_item_count_delta(lists, &request.list_id, added, 0, now));
        Ok(self.queued(change))
    }

    pub async fn update_item(
        &self,
        request: UpdateItemRequest,
    ) -> Result<MutationOutcome<ShoppingItem>, RemoteError> {
        if !self.tracker.is_offline() {
            let result = self.remote.update_item(&request).await;
            return self.finish_remote(
                result,
                &[
                    QueryKey::Lists,
                    QueryKey::ListDetail(request.list_id.clone()),
                ],
                "update item",
                |item| format!("Updated {}", item.name),
            );
        }

        let now = Utc::now();
        let completed_delta = self.completed_delta(&request);
        let change = self
            .tracker
            .add_pending_change(Mutation::UpdateItem(request.clone()), Vec::new());

        self.patch_detail(&request.list_id, |detail| {
            apply_update_item(detail, &request, now)
        });
        if completed_delta != 0 {
            self.patch_lists(|lists| {
                apply_item_count_delta(lists, &request.list_id, 0, completed_delta, now)
            });
        }
        Ok(self.queued(change))
    }

    pub async fn delete_list(
        &self,
        request: DeleteListRequest,
    ) -> Result<MutationOutcome<()>, RemoteError> {
        if !self.tracker.is_offline() {
            let result = self.remote.delete_list(&request).await;
            return self.finish_remote(
                result,
                &[
                    QueryKey::Lists,
                    QueryKey::ListDetail(request.list_id.clone()),
                ],
                "delete list",
                |_| "Deleted list".to_string(),
            );
        }

        let change = self
            .tracker
            .add_pending_change(Mutation::DeleteList(request.clone()), Vec::new());
        self.patch_lists(|lists| apply_delete_list(lists, &request.list_id));

        lock(&self.cache).invalidate(&QueryKey::ListDetail(request.list_id.clone()));
        self.mirror
            .remove(&MirrorKey::ListDetail(request.list_id.clone()));
        Ok(self.queued(change))
    }

    fn finish_remote<T, F>(
        &self,
        result: Result<T, RemoteError>,
        invalidate: &[QueryKey],
        action: &str,
        success: F,
    ) -> Result<MutationOutcome<T>, RemoteError>
    where
        F: FnOnce(&T) -> String,
    {
        match result {
            Ok(value) => {
                {
                    let mut cache = lock(&self.cache);
                    for key in invalidate {
                        cache.invalidate(key);
                    }
                }
                self.notifier.notify(Notification::success(success(&value)));
                Ok(MutationOutcome::Applied(value))
            }
            Err(e) => {
                tracing::warn!("Failed to {}: {}", action, e);
                self.notifier
                    .notify(Notification::error(format!("Failed to {}: {}", action, e)));
                Err(e)
            }
        }
    }

    fn queued<T>(&self, change: PendingChange) -> MutationOutcome<T> {
        self.notifier.notify(Notification::info(QUEUED_MESSAGE));
        MutationOutcome::Queued(change)
    }

    /// Patch the list collection in the cache and in the mirror.
    ///
    /// A collection that was never stored stays absent.
    fn patch_lists<F>(&self, patch: F)
    where
        F: Fn(Vec<ShoppingList>) -> Vec<ShoppingList>,
    {
        lock(&self.cache).patch_lists(&patch);
        if let Some(lists) = self.mirror.get::<Vec<ShoppingList>>(&MirrorKey::ShoppingLists) {
            self.mirror.set(&MirrorKey::ShoppingLists, &patch(lists));
        }
    }

    /// Patch a list detail in the cache and in the mirror.
    ///
    /// A list created offline has no stored detail yet; one is started from
    /// its summary.
    fn patch_detail<F>(&self, list_id: &RecordId, patch: F)
    where
        F: Fn(ShoppingListDetail) -> ShoppingListDetail,
    {
        lock(&self.cache).patch_detail(list_id, &patch);
        let key = MirrorKey::ListDetail(list_id.clone());
        if let Some(detail) = self
            .mirror
            .get(&key)
            .or_else(|| self.provisional_detail(list_id))
        {
            self.mirror.set(&key, &patch(detail));
        }
    }

    fn provisional_detail(&self, list_id: &RecordId) -> Option<ShoppingListDetail> {
        if !list_id.is_local() {
            return None;
        }
        let lists: Vec<ShoppingList> = self.mirror.get(&MirrorKey::ShoppingLists)?;
        lists
            .into_iter()
            .find(|l| &l.id == list_id)
            .map(ShoppingListDetail::from_list)
    }

    /// Change in the list's completed count implied by an item update.
    fn completed_delta(&self, request: &UpdateItemRequest) -> i64 {
        let Some(done) = request.changes.is_completed else {
            return 0;
        };
        let cached = lock(&self.cache)
            .detail(&request.list_id)
            .and_then(|d| d.find_item(&request.item_id))
            .map(|i| i.is_completed);
        let was_done = cached.or_else(|| {
            self.mirror
                .get::<ShoppingListDetail>(&MirrorKey::ListDetail(request.list_id.clone()))
                .and_then(|d| d.find_item(&request.item_id).map(|i| i.is_completed))
        });
        match was_done {
            Some(was) if was != done => {
                if done {
                    1
                } else {
                    -1
                }
            }
            _ => 0,
        }
    }
}
