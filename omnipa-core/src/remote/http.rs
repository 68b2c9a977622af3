//! HTTP client for the OmniPA shopping API.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{server_id, RemoteError, ShoppingRemote};
use crate::models::{
    AddItemsRequest, CreateListRequest, DeleteListRequest, ItemBatch, RecordId, ShoppingItem,
    ShoppingList, ShoppingListDetail, UpdateItemRequest,
};

/// Error body returned by the server.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Remote store backed by the HTTP API, authenticated with a bearer API key.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    server_url: String,
    api_key: String,
}

impl HttpRemote {
    pub fn new(server_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let server_url: String = server_url.into();
        Self {
            client: reqwest::Client::new(),
            server_url: server_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.server_url, path)
    }

    fn list_url(&self, id: &RecordId) -> Result<String, RemoteError> {
        let id = server_id(id)?;
        Ok(self.url(&format!("/shopping-lists/{}", urlencoding::encode(id))))
    }

    /// Send a request and turn non-success statuses into errors.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string(),
        };
        tracing::debug!("Server returned {}: {}", status, message);

        if status == StatusCode::NOT_FOUND {
            Err(RemoteError::NotFound(message))
        } else {
            Err(RemoteError::Status {
                status: status.as_u16(),
                message,
            })
        }
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        self.execute(request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }
}

#[async_trait]
impl ShoppingRemote for HttpRemote {
    async fn fetch_lists(&self) -> Result<Vec<ShoppingList>, RemoteError> {
        self.execute_json(self.client.get(self.url("/shopping-lists")))
            .await
    }

    async fn fetch_list(&self, id: &RecordId) -> Result<ShoppingListDetail, RemoteError> {
        let url = self.list_url(id)?;
        self.execute_json(self.client.get(url)).await
    }

    async fn create_list(&self, request: &CreateListRequest) -> Result<ShoppingList, RemoteError> {
        self.execute_json(self.client.post(self.url("/shopping-lists")).json(request))
            .await
    }

    async fn add_items(&self, request: &AddItemsRequest) -> Result<Vec<ShoppingItem>, RemoteError> {
        let url = format!("{}/items", self.list_url(&request.list_id)?);
        let body = ItemBatch {
            items: request.items.clone(),
        };
        self.execute_json(self.client.post(url).json(&body)).await
    }

    async fn update_item(&self, request: &UpdateItemRequest) -> Result<ShoppingItem, RemoteError> {
        // The list must exist on the server before its items can be addressed
        server_id(&request.list_id)?;
        let item_id = server_id(&request.item_id)?;
        let url = self.url(&format!("/shopping-items/{}", urlencoding::encode(item_id)));
        self.execute_json(self.client.patch(url).json(&request.changes))
            .await
    }

    async fn delete_list(&self, request: &DeleteListRequest) -> Result<(), RemoteError> {
        let url = self.list_url(&request.list_id)?;
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}
