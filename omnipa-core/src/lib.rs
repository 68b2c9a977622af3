//! OmniPA Core Library
//!
//! Offline-aware sync layer for OmniPA shopping lists: a remote client, a
//! local mirror, a pending-change queue and the reconciler that replays it.

pub mod cache;
pub mod dispatcher;
pub mod mirror;
pub mod models;
pub mod notify;
pub mod offline;
pub mod optimistic;
pub mod queries;
pub mod reconciler;
pub mod remote;
pub mod service;
pub mod task;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use cache::{QueryCache, QueryKey, SharedCache};
pub use dispatcher::{MutationDispatcher, MutationOutcome};
pub use mirror::{FileStore, KeyValueStore, LocalMirror, MemoryStore, MirrorError, MirrorKey};
pub use models::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, ItemBatch, ItemChanges, NewItem,
    RecordId, ShoppingItem, ShoppingList, ShoppingListDetail, UpdateItemRequest,
};
pub use notify::{Notification, NotificationLevel, Notifier, TracingNotifier};
pub use offline::{
    check_server, ChangeType, ConnectivitySubscription, Mutation, NetworkMonitor, NetworkStatus,
    OfflineTracker, PendingChange,
};
pub use queries::{QueryError, ShoppingQueries};
pub use reconciler::{Reconciler, SyncReport};
pub use remote::{HttpRemote, InMemoryRemote, RemoteError, ShoppingRemote};
pub use service::{ShoppingSync, SyncOptions};
pub use task::BackgroundTask;

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
