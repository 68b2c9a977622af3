//! In-memory read cache with a staleness window.
//!
//! Holds the list collection and each list detail that has been read, with
//! the time it was fetched. Online reads reuse an entry while it is fresh;
//! mutations invalidate entries so the next read goes back to the server.
//! Offline mutations patch entries in place.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::models::{RecordId, ShoppingList, ShoppingListDetail};

/// Default time an entry stays fresh while online.
pub const DEFAULT_STALE_TIME: Duration = Duration::from_secs(5 * 60);

/// Cache shared between the dispatcher, queries and reconciler.
pub type SharedCache = Arc<Mutex<QueryCache>>;

/// Identifies a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryKey {
    Lists,
    ListDetail(RecordId),
}

#[derive(Debug, Clone)]
struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

impl<T> Entry<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }
}

#[derive(Debug)]
pub struct QueryCache {
    stale_time: Duration,
    lists: Option<Entry<Vec<ShoppingList>>>,
    details: HashMap<RecordId, Entry<ShoppingListDetail>>,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        Self {
            stale_time,
            lists: None,
            details: HashMap::new(),
        }
    }

    pub fn shared(stale_time: Duration) -> SharedCache {
        Arc::new(Mutex::new(Self::new(stale_time)))
    }

    fn is_fresh<T>(&self, entry: &Entry<T>) -> bool {
        entry.fetched_at.elapsed() < self.stale_time
    }

    /// The list collection, if cached and fresh.
    pub fn fresh_lists(&self) -> Option<Vec<ShoppingList>> {
        self.lists
            .as_ref()
            .filter(|e| self.is_fresh(e))
            .map(|e| e.value.clone())
    }

    /// A list detail, if cached and fresh.
    pub fn fresh_detail(&self, id: &RecordId) -> Option<ShoppingListDetail> {
        self.details
            .get(id)
            .filter(|e| self.is_fresh(e))
            .map(|e| e.value.clone())
    }

    /// The list collection regardless of age.
    pub fn lists(&self) -> Option<&Vec<ShoppingList>> {
        self.lists.as_ref().map(|e| &e.value)
    }

    /// A list detail regardless of age.
    pub fn detail(&self, id: &RecordId) -> Option<&ShoppingListDetail> {
        self.details.get(id).map(|e| &e.value)
    }

    pub fn set_lists(&mut self, lists: Vec<ShoppingList>) {
        self.lists = Some(Entry::new(lists));
    }

    pub fn set_detail(&mut self, detail: ShoppingListDetail) {
        self.details
            .insert(detail.list.id.clone(), Entry::new(detail));
    }

    /// Replace the cached list collection with `patch(current)`.
    ///
    /// Does nothing if the collection is not cached. The fetch time is kept.
    pub fn patch_lists<F>(&mut self, patch: F)
    where
        F: FnOnce(Vec<ShoppingList>) -> Vec<ShoppingList>,
    {
        if let Some(entry) = self.lists.as_mut() {
            let current = std::mem::take(&mut entry.value);
            entry.value = patch(current);
        }
    }

    /// Replace a cached list detail with `patch(current)`.
    ///
    /// Does nothing if the detail is not cached. The fetch time is kept.
    pub fn patch_detail<F>(&mut self, id: &RecordId, patch: F)
    where
        F: FnOnce(ShoppingListDetail) -> ShoppingListDetail,
    {
        if let Some(entry) = self.details.remove(id) {
            let fetched_at = entry.fetched_at;
            let value = patch(entry.value);
            self.details
                .insert(value.list.id.clone(), Entry { value, fetched_at });
        }
    }

    /// Drop one entry so the next online read refetches it.
    pub fn invalidate(&mut self, key: &QueryKey) {
        match key {
            QueryKey::Lists => self.lists = None,
            QueryKey::ListDetail(id) => {
                self.details.remove(id);
            }
        }
    }

    /// Drop every entry.
    pub fn invalidate_all(&mut self) {
        self.lists = None;
        self.details.clear();
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_STALE_TIME)
    }
}
