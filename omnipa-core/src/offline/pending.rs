//! Pending changes: mutations recorded offline and replayed later.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::models::{
    resolve_id, AddItemsRequest, CreateListRequest, DeleteListRequest, RecordId,
    UpdateItemRequest,
};

/// Kind of a pending change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    CreateList,
    AddItems,
    UpdateItem,
    DeleteList,
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeType::CreateList => write!(f, "create_list"),
            ChangeType::AddItems => write!(f, "add_items"),
            ChangeType::UpdateItem => write!(f, "update_item"),
            ChangeType::DeleteList => write!(f, "delete_list"),
        }
    }
}

/// A mutation together with the exact payload it sends.
///
/// Serialized as `{"type": "...", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Mutation {
    CreateList(CreateListRequest),
    AddItems(AddItemsRequest),
    UpdateItem(UpdateItemRequest),
    DeleteList(DeleteListRequest),
}

impl Mutation {
    pub fn change_type(&self) -> ChangeType {
        match self {
            Mutation::CreateList(_) => ChangeType::CreateList,
            Mutation::AddItems(_) => ChangeType::AddItems,
            Mutation::UpdateItem(_) => ChangeType::UpdateItem,
            Mutation::DeleteList(_) => ChangeType::DeleteList,
        }
    }

    /// The list this mutation targets. A new list has none yet.
    pub fn list_id(&self) -> Option<&RecordId> {
        match self {
            Mutation::CreateList(_) => None,
            Mutation::AddItems(req) => Some(&req.list_id),
            Mutation::UpdateItem(req) => Some(&req.list_id),
            Mutation::DeleteList(req) => Some(&req.list_id),
        }
    }

    /// Rewrite provisional ids that the server has since assigned.
    ///
    /// Returns true if anything changed.
    pub fn resolve_ids(&mut self, resolved: &HashMap<Uuid, String>) -> bool {
        match self {
            Mutation::CreateList(_) => false,
            Mutation::AddItems(req) => resolve_id(&mut req.list_id, resolved),
            Mutation::UpdateItem(req) => {
                let list = resolve_id(&mut req.list_id, resolved);
                let item = resolve_id(&mut req.item_id, resolved);
                list || item
            }
            Mutation::DeleteList(req) => resolve_id(&mut req.list_id, resolved),
        }
    }
}

/// One deferred mutation in the offline queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    /// `<epoch millis>-<random suffix>`
    pub id: String,
    #[serde(flatten)]
    pub mutation: Mutation,
    /// Enqueue time in epoch millis; replay order
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_id: Option<RecordId>,
    /// Provisional ids minted for the records this change creates, in payload order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provisional_ids: Vec<Uuid>,
    /// Failed replay attempts so far
    #[serde(default)]
    pub attempts: u32,
}

impl PendingChange {
    pub fn change_type(&self) -> ChangeType {
        self.mutation.change_type()
    }

    /// Returns true if this change belongs to the given list.
    pub fn targets(&self, list_id: &RecordId) -> bool {
        self.list_id.as_ref() == Some(list_id)
    }

    /// Rewrite provisional ids in both the payload and the scoping list id.
    pub fn resolve_ids(&mut self, resolved: &HashMap<Uuid, String>) -> bool {
        let payload = self.mutation.resolve_ids(resolved);
        let scope = match self.list_id.as_mut() {
            Some(id) => resolve_id(id, resolved),
            None => false,
        };
        payload || scope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemChanges, NewItem};

    fn add_items_change(list_id: RecordId) -> PendingChange {
        let mutation = Mutation::AddItems(AddItemsRequest::new(
            list_id.clone(),
            vec![NewItem::new("Milk")],
        ));
        PendingChange {
            id: "1700000000000-abc".to_string(),
            mutation,
            timestamp: 1_700_000_000_000,
            list_id: Some(list_id),
            provisional_ids: vec![Uuid::new_v4()],
            attempts: 0,
        }
    }

    #[test]
    fn test_json_layout() {
        let change = add_items_change(RecordId::server("L1"));
        let json = serde_json::to_value(&change).unwrap();

        assert_eq!(json["type"], "add_items");
        assert_eq!(json["data"]["listId"], "L1");
        assert_eq!(json["data"]["items"][0]["name"], "Milk");
        assert_eq!(json["listId"], "L1");
        assert_eq!(json["timestamp"], 1_700_000_000_000_i64);

        let parsed: PendingChange = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, change);
    }

    #[test]
    fn test_create_list_has_no_list_id() {
        let mutation = Mutation::CreateList(CreateListRequest::new("Groceries"));
        assert!(mutation.list_id().is_none());
        assert_eq!(mutation.change_type(), ChangeType::CreateList);
        assert_eq!(mutation.change_type().to_string(), "create_list");
    }

    #[test]
    fn test_resolve_ids_rewrites_payload_and_scope() {
        let local_list = Uuid::new_v4();
        let local_item = Uuid::new_v4();
        let mut change = PendingChange {
            id: "1-a".to_string(),
            mutation: Mutation::UpdateItem(UpdateItemRequest::new(
                RecordId::Local(local_list),
                RecordId::Local(local_item),
                ItemChanges::default(),
            )),
            timestamp: 1,
            list_id: Some(RecordId::Local(local_list)),
            provisional_ids: Vec::new(),
            attempts: 0,
        };

        let mut resolved = HashMap::new();
        resolved.insert(local_list, "srv-list".to_string());
        resolved.insert(local_item, "srv-item".to_string());

        assert!(change.resolve_ids(&resolved));
        assert!(change.targets(&RecordId::server("srv-list")));
        match &change.mutation {
            Mutation::UpdateItem(req) => {
                assert_eq!(req.list_id, RecordId::server("srv-list"));
                assert_eq!(req.item_id, RecordId::server("srv-item"));
            }
            other => panic!("unexpected mutation {:?}", other),
        }

        // Nothing left to resolve
        assert!(!change.resolve_ids(&resolved));
    }

    #[test]
    fn test_attempts_default_when_missing() {
        let json = serde_json::json!({
            "id": "1-a",
            "type": "delete_list",
            "data": { "listId": "L1" },
            "timestamp": 1,
            "listId": "L1"
        });
        let change: PendingChange = serde_json::from_value(json).unwrap();
        assert_eq!(change.attempts, 0);
        assert!(change.provisional_ids.is_empty());
        assert_eq!(change.change_type(), ChangeType::DeleteList);
    }
}
