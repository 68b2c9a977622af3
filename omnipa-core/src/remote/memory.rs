//! In-process remote store.
//!
//! Behaves like the HTTP server (server-assigned ids, computed counts, soft
//! delete) and records every call. Availability can be toggled and calls can
//! be made to fail, which makes it the remote of choice for exercising the
//! offline paths.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Mutex;
use uuid::Uuid;

use super::{server_id, RemoteError, ShoppingRemote};
use crate::lock;
use crate::models::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, NewItem, RecordId, ShoppingItem,
    ShoppingList, ShoppingListDetail, UpdateItemRequest,
};

/// A call received by [`InMemoryRemote`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    FetchLists,
    FetchList(RecordId),
    CreateList(CreateListRequest),
    AddItems(AddItemsRequest),
    UpdateItem(UpdateItemRequest),
    DeleteList(DeleteListRequest),
}

type FailWhen = Box<dyn Fn(&RemoteCall) -> bool + Send + Sync>;

#[derive(Default)]
struct MemoryState {
    lists: Vec<ShoppingList>,
    items: Vec<ShoppingItem>,
    calls: Vec<RemoteCall>,
}

pub struct InMemoryRemote {
    state: Mutex<MemoryState>,
    available: Mutex<bool>,
    fail_when: Mutex<Option<FailWhen>>,
}

impl std::fmt::Debug for InMemoryRemote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.state);
        f.debug_struct("InMemoryRemote")
            .field("lists", &state.lists.len())
            .field("items", &state.items.len())
            .field("calls", &state.calls.len())
            .finish()
    }
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            available: Mutex::new(true),
            fail_when: Mutex::new(None),
        }
    }

    /// While unavailable every call fails with a network error.
    pub fn set_available(&self, available: bool) {
        *lock(&self.available) = available;
    }

    /// Fail calls matching `predicate` with a 500 until cleared.
    pub fn fail_when<F>(&self, predicate: F)
    where
        F: Fn(&RemoteCall) -> bool + Send + Sync + 'static,
    {
        *lock(&self.fail_when) = Some(Box::new(predicate));
    }

    pub fn clear_failures(&self) {
        *lock(&self.fail_when) = None;
    }

    /// Every call received so far, including failed ones.
    pub fn calls(&self) -> Vec<RemoteCall> {
        lock(&self.state).calls.clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }

    /// Insert a list directly, bypassing the call log.
    pub fn seed_list(&self, name: &str) -> ShoppingList {
        let list = ShoppingList::new(RecordId::server(Uuid::new_v4().to_string()), name, Utc::now());
        lock(&self.state).lists.push(list.clone());
        list
    }

    /// Insert an item directly, bypassing the call log.
    pub fn seed_item(&self, list_id: &RecordId, item: NewItem) -> ShoppingItem {
        let item = ShoppingItem::from_new(
            RecordId::server(Uuid::new_v4().to_string()),
            list_id.clone(),
            &item,
            Utc::now(),
        );
        lock(&self.state).items.push(item.clone());
        item
    }

    /// The stored list with its server-side counts, archived or not.
    pub fn stored_list(&self, id: &RecordId) -> Option<ShoppingList> {
        let state = lock(&self.state);
        state
            .lists
            .iter()
            .find(|l| &l.id == id)
            .map(|l| with_counts(l, &state.items))
    }

    pub fn stored_items(&self, list_id: &RecordId) -> Vec<ShoppingItem> {
        lock(&self.state)
            .items
            .iter()
            .filter(|i| &i.list_id == list_id)
            .cloned()
            .collect()
    }

    /// Log the call and decide whether it goes through.
    fn receive(&self, call: RemoteCall) -> Result<(), RemoteError> {
        let fail = lock(&self.fail_when)
            .as_ref()
            .map(|predicate| predicate(&call))
            .unwrap_or(false);
        lock(&self.state).calls.push(call);

        if !*lock(&self.available) {
            return Err(RemoteError::Network("connection refused".to_string()));
        }
        if fail {
            return Err(RemoteError::Status {
                status: 500,
                message: "Internal server error".to_string(),
            });
        }
        Ok(())
    }
}

fn with_counts(list: &ShoppingList, items: &[ShoppingItem]) -> ShoppingList {
    let on_list: Vec<&ShoppingItem> = items.iter().filter(|i| i.list_id == list.id).collect();
    let mut list = list.clone();
    list.item_count = on_list.len() as u32;
    list.completed_count = on_list.iter().filter(|i| i.is_completed).count() as u32;
    list
}

fn validation_error(message: &str) -> RemoteError {
    RemoteError::Status {
        status: 400,
        message: message.to_string(),
    }
}

fn not_found(what: &str, id: &RecordId) -> RemoteError {
    RemoteError::NotFound(format!("{} {} not found", what, id))
}

#[async_trait]
impl ShoppingRemote for InMemoryRemote {
    async fn fetch_lists(&self) -> Result<Vec<ShoppingList>, RemoteError> {
        self.receive(RemoteCall::FetchLists)?;
        let state = lock(&self.state);
        let mut lists: Vec<ShoppingList> = state
            .lists
            .iter()
            .filter(|l| !l.archived)
            .map(|l| with_counts(l, &state.items))
            .collect();
        lists.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(lists)
    }

    async fn fetch_list(&self, id: &RecordId) -> Result<ShoppingListDetail, RemoteError> {
        self.receive(RemoteCall::FetchList(id.clone()))?;
        server_id(id)?;
        let state = lock(&self.state);
        let list = state
            .lists
            .iter()
            .find(|l| &l.id == id && !l.archived)
            .ok_or_else(|| not_found("List", id))?;
        Ok(ShoppingListDetail {
            list: with_counts(list, &state.items),
            items: state
                .items
                .iter()
                .filter(|i| &i.list_id == id)
                .cloned()
                .collect(),
        })
    }

    async fn create_list(&self, request: &CreateListRequest) -> Result<ShoppingList, RemoteError> {
        self.receive(RemoteCall::CreateList(request.clone()))?;
        let name = request.name.trim();
        if name.is_empty() {
            return Err(validation_error("List name must not be empty"));
        }
        let list = ShoppingList::new(
            RecordId::server(Uuid::new_v4().to_string()),
            name,
            Utc::now(),
        )
        .with_description(request.description.clone());
        lock(&self.state).lists.push(list.clone());
        Ok(list)
    }

    async fn add_items(&self, request: &AddItemsRequest) -> Result<Vec<ShoppingItem>, RemoteError> {
        self.receive(RemoteCall::AddItems(request.clone()))?;
        server_id(&request.list_id)?;
        if request.items.is_empty() {
            return Err(validation_error("At least one item is required"));
        }

        let mut state = lock(&self.state);
        if !state
            .lists
            .iter()
            .any(|l| l.id == request.list_id && !l.archived)
        {
            return Err(not_found("List", &request.list_id));
        }

        let now = Utc::now();
        let created: Vec<ShoppingItem> = request
            .items
            .iter()
            .map(|item| {
                ShoppingItem::from_new(
                    RecordId::server(Uuid::new_v4().to_string()),
                    request.list_id.clone(),
                    item,
                    now,
                )
            })
            .collect();
        state.items.extend(created.iter().cloned());
        if let Some(list) = state.lists.iter_mut().find(|l| l.id == request.list_id) {
            list.updated_at = now;
        }
        Ok(created)
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> Result<ShoppingItem, RemoteError> {
        self.receive(RemoteCall::UpdateItem(request.clone()))?;
        server_id(&request.list_id)?;
        server_id(&request.item_id)?;

        let mut state = lock(&self.state);
        let item = state
            .items
            .iter_mut()
            .find(|i| i.id == request.item_id)
            .ok_or_else(|| not_found("Item", &request.item_id))?;
        item.apply_changes(&request.changes, Utc::now());
        Ok(item.clone())
    }

    async fn delete_list(&self, request: &DeleteListRequest) -> Result<(), RemoteError> {
        self.receive(RemoteCall::DeleteList(request.clone()))?;
        server_id(&request.list_id)?;

        let mut state = lock(&self.state);
        let list = state
            .lists
            .iter_mut()
            .find(|l| l.id == request.list_id && !l.archived)
            .ok_or_else(|| not_found("List", &request.list_id))?;
        list.archived = true;
        list.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemChanges;

    #[tokio::test]
    async fn test_counts_are_computed() {
        let remote = InMemoryRemote::new();
        let list = remote.seed_list("Groceries");
        let items = remote
            .add_items(&AddItemsRequest::new(
                list.id.clone(),
                vec![NewItem::new("Milk"), NewItem::new("Eggs")],
            ))
            .await
            .unwrap();

        remote
            .update_item(&UpdateItemRequest::new(
                list.id.clone(),
                items[0].id.clone(),
                ItemChanges {
                    is_completed: Some(true),
                    ..Default::default()
                },
            ))
            .await
            .unwrap();

        let detail = remote.fetch_list(&list.id).await.unwrap();
        assert_eq!(detail.items.len(), 2);
        assert_eq!(detail.list.item_count, 2);
        assert_eq!(detail.list.completed_count, 1);
    }

    #[tokio::test]
    async fn test_delete_is_soft() {
        let remote = InMemoryRemote::new();
        let list = remote.seed_list("Groceries");
        remote
            .delete_list(&DeleteListRequest::new(list.id.clone()))
            .await
            .unwrap();

        assert!(remote.fetch_lists().await.unwrap().is_empty());
        assert!(remote.stored_list(&list.id).unwrap().archived);
        assert!(matches!(
            remote.fetch_list(&list.id).await,
            Err(RemoteError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_unavailable_and_failing_calls_are_logged() {
        let remote = InMemoryRemote::new();
        remote.set_available(false);
        assert!(matches!(
            remote.fetch_lists().await,
            Err(RemoteError::Network(_))
        ));

        remote.set_available(true);
        remote.fail_when(|call| matches!(call, RemoteCall::CreateList(_)));
        assert!(matches!(
            remote.create_list(&CreateListRequest::new("Party")).await,
            Err(RemoteError::Status { status: 500, .. })
        ));
        remote.clear_failures();
        remote
            .create_list(&CreateListRequest::new("Party"))
            .await
            .unwrap();

        assert_eq!(remote.calls().len(), 3);
        assert_eq!(remote.calls()[0], RemoteCall::FetchLists);
    }

    #[tokio::test]
    async fn test_rejects_empty_batch_and_provisional_ids() {
        let remote = InMemoryRemote::new();
        let list = remote.seed_list("Groceries");
        assert!(matches!(
            remote
                .add_items(&AddItemsRequest::new(list.id.clone(), Vec::new()))
                .await,
            Err(RemoteError::Status { status: 400, .. })
        ));
        assert!(matches!(
            remote
                .add_items(&AddItemsRequest::new(
                    RecordId::new_local(),
                    vec![NewItem::new("Milk")]
                ))
                .await,
            Err(RemoteError::Unconfirmed(_))
        ));
    }
}
