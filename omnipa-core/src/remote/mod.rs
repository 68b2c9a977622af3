//! Remote shopping store.
//!
//! [`ShoppingRemote`] is the seam between the sync layer and the server.
//! [`HttpRemote`] talks to the OmniPA HTTP API; [`InMemoryRemote`] keeps
//! everything in process.

mod http;
mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, RecordId, ShoppingItem, ShoppingList,
    ShoppingListDetail, UpdateItemRequest,
};

pub use http::HttpRemote;
pub use memory::{InMemoryRemote, RemoteCall};

/// Errors from the remote store.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    /// The request never got an answer
    #[error("Network error: {0}")]
    Network(String),

    #[error("Server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    /// The id was minted offline and the server has not assigned one yet
    #[error("{0} has not been synced yet. Run `omnipa sync` first.")]
    Unconfirmed(RecordId),

    #[error("Invalid response: {0}")]
    Decode(String),
}

/// Operations the sync layer needs from the server.
#[async_trait]
pub trait ShoppingRemote: Send + Sync {
    /// Non-archived lists for the current user.
    async fn fetch_lists(&self) -> Result<Vec<ShoppingList>, RemoteError>;

    async fn fetch_list(&self, id: &RecordId) -> Result<ShoppingListDetail, RemoteError>;

    async fn create_list(&self, request: &CreateListRequest) -> Result<ShoppingList, RemoteError>;

    /// Returns the created items in request order.
    async fn add_items(&self, request: &AddItemsRequest) -> Result<Vec<ShoppingItem>, RemoteError>;

    async fn update_item(&self, request: &UpdateItemRequest) -> Result<ShoppingItem, RemoteError>;

    async fn delete_list(&self, request: &DeleteListRequest) -> Result<(), RemoteError>;
}

/// The server id of a record, or [`RemoteError::Unconfirmed`] for a provisional one.
pub fn server_id(id: &RecordId) -> Result<&str, RemoteError> {
    id.as_server()
        .ok_or_else(|| RemoteError::Unconfirmed(id.clone()))
}
