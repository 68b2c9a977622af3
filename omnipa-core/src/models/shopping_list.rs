//! Shopping lists and their items.
//!
//! These are the records served by the remote store and cached locally.
//! Counts and prices are computed by the server; records synthesized
//! offline carry placeholders until the next successful sync.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ItemChanges, NewItem, RecordId};

/// Summary of a shopping list as it appears in the list collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingList {
    pub id: RecordId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Number of items on the list
    #[serde(default)]
    pub item_count: u32,
    /// Number of items checked off
    #[serde(default)]
    pub completed_count: u32,
    /// Soft-delete flag; archived lists are hidden from the collection
    #[serde(default)]
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShoppingList {
    /// Create an empty list record.
    pub fn new(id: RecordId, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            item_count: 0,
            completed_count: 0,
            archived: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description.
    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}/{} done)",
            self.name, self.completed_count, self.item_count
        )
    }
}

/// A single entry on a shopping list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingItem {
    pub id: RecordId,
    pub list_id: RecordId,
    pub name: String,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    /// Server-computed estimate; unknown for items added offline
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub actual_price: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShoppingItem {
    /// Build an item record from a new-item payload.
    ///
    /// Server-computed fields are left empty.
    pub fn from_new(id: RecordId, list_id: RecordId, item: &NewItem, now: DateTime<Utc>) -> Self {
        Self {
            id,
            list_id,
            name: item.name.clone(),
            quantity: item.quantity,
            unit: item.unit.clone(),
            category: item.category.clone(),
            notes: item.notes.clone(),
            is_completed: false,
            estimated_price: None,
            actual_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Shallow-merge a set of changes into this item.
    ///
    /// Fields absent from `changes` keep their current value.
    pub fn apply_changes(&mut self, changes: &ItemChanges, now: DateTime<Utc>) {
        if let Some(name) = &changes.name {
            self.name = name.clone();
        }
        if let Some(quantity) = changes.quantity {
            self.quantity = Some(quantity);
        }
        if let Some(unit) = &changes.unit {
            self.unit = Some(unit.clone());
        }
        if let Some(category) = &changes.category {
            self.category = Some(category.clone());
        }
        if let Some(notes) = &changes.notes {
            self.notes = Some(notes.clone());
        }
        if let Some(done) = changes.is_completed {
            self.is_completed = done;
        }
        if let Some(price) = changes.actual_price {
            self.actual_price = Some(price);
        }
        self.updated_at = now;
    }
}

impl fmt::Display for ShoppingItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.is_completed { "[x]" } else { "[ ]" };
        match (self.quantity, &self.unit) {
            (Some(qty), Some(unit)) => write!(f, "{} {} {} {}", check, qty, unit, self.name),
            (Some(qty), None) => write!(f, "{} {} {}", check, qty, self.name),
            _ => write!(f, "{} {}", check, self.name),
        }
    }
}

/// A shopping list together with all of its items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShoppingListDetail {
    #[serde(flatten)]
    pub list: ShoppingList,
    #[serde(default)]
    pub items: Vec<ShoppingItem>,
}

impl ShoppingListDetail {
    /// Start a detail record from a list summary with no items.
    pub fn from_list(list: ShoppingList) -> Self {
        Self {
            list,
            items: Vec::new(),
        }
    }

    /// Find an item by id.
    pub fn find_item(&self, id: &RecordId) -> Option<&ShoppingItem> {
        self.items.iter().find(|i| &i.id == id)
    }

    /// Recompute the list's counts from its items.
    pub fn recount(&mut self) {
        self.list.item_count = self.items.len() as u32;
        self.list.completed_count = self.items.iter().filter(|i| i.is_completed).count() as u32;
    }
}
