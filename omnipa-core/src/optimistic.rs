//! Optimistic patches applied while offline.
//!
//! Each function takes the current cached value and returns the value the
//! server is expected to produce once the change is replayed. Ids, counts and
//! prices are best guesses until the next successful sync.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AddItemsRequest, CreateListRequest, RecordId, ShoppingItem, ShoppingList, ShoppingListDetail,
    UpdateItemRequest,
};

/// Append a provisional list with no items.
pub fn apply_create_list(
    mut lists: Vec<ShoppingList>,
    request: &CreateListRequest,
    local_id: Uuid,
    now: DateTime<Utc>,
) -> Vec<ShoppingList> {
    let list = ShoppingList::new(RecordId::Local(local_id), request.name.clone(), now)
        .with_description(request.description.clone());
    lists.push(list);
    lists
}

/// Append provisional items to a list detail.
///
/// `local_ids` pairs with `request.items` by position.
pub fn apply_add_items(
    mut detail: ShoppingListDetail,
    request: &AddItemsRequest,
    local_ids: &[Uuid],
    now: DateTime<Utc>,
) -> ShoppingListDetail {
    for (item, local_id) in request.items.iter().zip(local_ids) {
        detail.items.push(ShoppingItem::from_new(
            RecordId::Local(*local_id),
            request.list_id.clone(),
            item,
            now,
        ));
    }
    detail.recount();
    detail.list.updated_at = now;
    detail
}

/// Merge the requested changes into the matching item.
///
/// An unknown item leaves the detail unchanged.
pub fn apply_update_item(
    mut detail: ShoppingListDetail,
    request: &UpdateItemRequest,
    now: DateTime<Utc>,
) -> ShoppingListDetail {
    let Some(item) = detail.items.iter_mut().find(|i| i.id == request.item_id) else {
        return detail;
    };
    item.apply_changes(&request.changes, now);
    detail.recount();
    detail
}

/// Remove a list from the collection.
pub fn apply_delete_list(mut lists: Vec<ShoppingList>, list_id: &RecordId) -> Vec<ShoppingList> {
    lists.retain(|l| &l.id != list_id);
    lists
}

/// Adjust a list's counts in the collection. Counts never go below zero.
pub fn apply_item_count_delta(
    mut lists: Vec<ShoppingList>,
    list_id: &RecordId,
    items_delta: i64,
    completed_delta: i64,
    now: DateTime<Utc>,
) -> Vec<ShoppingList> {
    if let Some(list) = lists.iter_mut().find(|l| &l.id == list_id) {
        list.item_count = shift(list.item_count, items_delta);
        list.completed_count = shift(list.completed_count, completed_delta);
        list.updated_at = now;
    }
    lists
}

fn shift(count: u32, delta: i64) -> u32 {
    (i64::from(count) + delta).clamp(0, i64::from(u32::MAX)) as u32
}
