//! Request payloads sent to the remote store.
//!
//! A queued change stores exactly the payload that would have been sent, so
//! these types double as the `data` of a pending change.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::RecordId;

/// Create a new shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateListRequest {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CreateListRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An item to be added to a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewItem {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl NewItem {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quantity: None,
            unit: None,
            category: None,
            notes: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        self.quantity = Some(quantity);
        self.unit = if unit.is_empty() { None } else { Some(unit) };
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// Body of the add-items endpoint. The list id travels in the URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemBatch {
    pub items: Vec<NewItem>,
}

/// Add a batch of items to a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemsRequest {
    pub list_id: RecordId,
    pub items: Vec<NewItem>,
}

impl AddItemsRequest {
    pub fn new(list_id: RecordId, items: Vec<NewItem>) -> Self {
        Self { list_id, items }
    }
}

/// Fields to change on an item. Absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_completed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_price: Option<f64>,
}

impl ItemChanges {
    /// Returns true if no field would change.
    pub fn is_empty(&self) -> bool {
        self == &ItemChanges::default()
    }
}

/// Update a single item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    pub list_id: RecordId,
    pub item_id: RecordId,
    pub changes: ItemChanges,
}

impl UpdateItemRequest {
    pub fn new(list_id: RecordId, item_id: RecordId, changes: ItemChanges) -> Self {
        Self {
            list_id,
            item_id,
            changes,
        }
    }
}

/// Archive a list. The server keeps the row and sets its archived flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteListRequest {
    pub list_id: RecordId,
}

impl DeleteListRequest {
    pub fn new(list_id: RecordId) -> Self {
        Self { list_id }
    }
}

/// Replace a provisional id with its server id if one has been assigned.
///
/// Returns true if the id changed.
pub(crate) fn resolve_id(id: &mut RecordId, resolved: &HashMap<Uuid, String>) -> bool {
    let server = id.local_id().and_then(|local| resolved.get(&local));
    match server {
        Some(server) => {
            *id = RecordId::Server(server.clone());
            true
        }
        None => false,
    }
}
