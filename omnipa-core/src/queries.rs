//! Read queries with offline fallback.

use std::sync::Arc;
use thiserror::Error;

use crate::cache::SharedCache;
use crate::lock;
use crate::mirror::{LocalMirror, MirrorKey};
use crate::models::{RecordId, ShoppingList, ShoppingListDetail};
use crate::offline::OfflineTracker;
use crate::remote::{RemoteError, ShoppingRemote};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    /// Offline and nothing has been stored locally for this query
    #[error("No offline data available")]
    NoOfflineData,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// Reads the list collection and list details.
///
/// Offline, reads come from the local mirror and never touch the network.
/// Online, a fresh cache entry is returned as is; otherwise the server is
/// asked and both the cache and the mirror are refreshed.
pub struct ShoppingQueries {
    remote: Arc<dyn ShoppingRemote>,
    tracker: Arc<OfflineTracker>,
    cache: SharedCache,
    mirror: LocalMirror,
}

impl ShoppingQueries {
    pub fn new(
        remote: Arc<dyn ShoppingRemote>,
        tracker: Arc<OfflineTracker>,
        cache: SharedCache,
        mirror: LocalMirror,
    ) -> Self {
        Self {
            remote,
            tracker,
            cache,
            mirror,
        }
    }

    pub async fn lists(&self) -> Result<Vec<ShoppingList>, QueryError> {
        if self.tracker.is_offline() {
            return self
                .mirror
                .get(&MirrorKey::ShoppingLists)
                .ok_or(QueryError::NoOfflineData);
        }

        let cached = lock(&self.cache).fresh_lists();
        if let Some(lists) = cached {
            return Ok(lists);
        }

        let lists = self.remote.fetch_lists().await?;
        tracing::debug!("Fetched {} list(s)", lists.len());
        lock(&self.cache).set_lists(lists.clone());
        self.mirror.set(&MirrorKey::ShoppingLists, &lists);
        Ok(lists)
    }

    pub async fn list_detail(&self, id: &RecordId) -> Result<ShoppingListDetail, QueryError> {
        // The server does not know provisional ids yet
        if self.tracker.is_offline() || id.is_local() {
            return self
                .mirror
                .get(&MirrorKey::ListDetail(id.clone()))
                .ok_or(QueryError::NoOfflineData);
        }

        let cached = lock(&self.cache).fresh_detail(id);
        if let Some(detail) = cached {
            return Ok(detail);
        }

        let detail = self.remote.fetch_list(id).await?;
        lock(&self.cache).set_detail(detail.clone());
        self.mirror
            .set(&MirrorKey::ListDetail(id.clone()), &detail);
        Ok(detail)
    }
}
