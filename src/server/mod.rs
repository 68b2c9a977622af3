//! HTTP API for the OmniPA shopping store.
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /api/shopping-lists`: Active lists, newest first
//! - `POST /api/shopping-lists`: Create a list
//! - `GET /api/shopping-lists/{id}`: A list with its items
//! - `DELETE /api/shopping-lists/{id}`: Archive a list
//! - `POST /api/shopping-lists/{id}/items`: Add a batch of items
//! - `PATCH /api/shopping-items/{id}`: Change fields on an item
//!
//! Every `/api` route needs `Authorization: Bearer <api-key>`.

mod auth;
mod error;
mod lists;

pub use error::ApiError;

use axum::{
    middleware,
    routing::{get, patch, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::ApiKeyStore;
use crate::db::ListRepository;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub lists: Arc<ListRepository>,
}

impl AppState {
    pub fn new(api_keys: ApiKeyStore, lists: ListRepository) -> Self {
        Self {
            api_keys: Arc::new(api_keys),
            lists: Arc::new(lists),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route(
            "/api/shopping-lists",
            get(lists::list_lists).post(lists::create_list),
        )
        .route(
            "/api/shopping-lists/{id}",
            get(lists::get_list).delete(lists::delete_list),
        )
        .route("/api/shopping-lists/{id}/items", post(lists::add_items))
        .route("/api/shopping-items/{id}", patch(lists::update_item))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKeyEntry;
    use crate::db::init_db;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tower::ServiceExt;

    const KEY: &str = "test-key";

    async fn setup() -> (Router, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        let keys = ApiKeyStore::from_entries([
            ApiKeyEntry {
                key: KEY.to_string(),
                user_id: "alice".to_string(),
            },
            ApiKeyEntry {
                key: "other-key".to_string(),
                user_id: "bob".to_string(),
            },
        ]);
        let app = router(AppState::new(keys, ListRepository::new(pool)));
        (app, temp_dir)
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        key: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(key) = key {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_is_public() {
        let (app, _dir) = setup().await;
        let (status, body) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_auth_required() {
        let (app, _dir) = setup().await;

        let (status, body) = send(&app, Method::GET, "/api/shopping-lists", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "missing_auth");

        let (status, body) =
            send(&app, Method::GET, "/api/shopping-lists", Some("wrong"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "invalid_key");
    }

    #[tokio::test]
    async fn test_list_lifecycle() {
        let (app, _dir) = setup().await;

        let (status, list) = send(
            &app,
            Method::POST,
            "/api/shopping-lists",
            Some(KEY),
            Some(json!({ "name": " Groceries ", "description": "Weekly" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(list["name"], "Groceries");
        assert_eq!(list["itemCount"], 0);
        let id = list["id"].as_str().unwrap().to_string();

        let (status, items) = send(
            &app,
            Method::POST,
            &format!("/api/shopping-lists/{}/items", id),
            Some(KEY),
            Some(json!({ "items": [{ "name": "Milk", "quantity": 2, "unit": "l" }, { "name": "Eggs" }] })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(items.as_array().unwrap().len(), 2);
        let item_id = items[1]["id"].as_str().unwrap().to_string();

        let (status, item) = send(
            &app,
            Method::PATCH,
            &format!("/api/shopping-items/{}", item_id),
            Some(KEY),
            Some(json!({ "isCompleted": true })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(item["isCompleted"], true);
        assert_eq!(item["name"], "Eggs");

        let (status, detail) = send(
            &app,
            Method::GET,
            &format!("/api/shopping-lists/{}", id),
            Some(KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["itemCount"], 2);
        assert_eq!(detail["completedCount"], 1);
        assert_eq!(detail["items"].as_array().unwrap().len(), 2);

        let (status, _) = send(
            &app,
            Method::DELETE,
            &format!("/api/shopping-lists/{}", id),
            Some(KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, lists) = send(&app, Method::GET, "/api/shopping-lists", Some(KEY), None).await;
        assert!(lists.as_array().unwrap().is_empty());

        let (status, body) = send(
            &app,
            Method::GET,
            &format!("/api/shopping-lists/{}", id),
            Some(KEY),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "not_found");
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let (app, _dir) = setup().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/shopping-lists",
            Some(KEY),
            Some(json!({ "name": "   " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");

        let (_, list) = send(
            &app,
            Method::POST,
            "/api/shopping-lists",
            Some(KEY),
            Some(json!({ "name": "Groceries" })),
        )
        .await;
        let items_uri = format!("/api/shopping-lists/{}/items", list["id"].as_str().unwrap());

        let (status, _) = send(
            &app,
            Method::POST,
            &items_uri,
            Some(KEY),
            Some(json!({ "items": [] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            &items_uri,
            Some(KEY),
            Some(json!({ "items": [{ "name": "Milk", "quantity": -1 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            Method::POST,
            &items_uri,
            Some(KEY),
            Some(json!({ "things": true })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_error");
    }

    #[tokio::test]
    async fn test_lists_are_private() {
        let (app, _dir) = setup().await;
        let (_, list) = send(
            &app,
            Method::POST,
            "/api/shopping-lists",
            Some(KEY),
            Some(json!({ "name": "Groceries" })),
        )
        .await;
        let uri = format!("/api/shopping-lists/{}", list["id"].as_str().unwrap());

        let (status, _) = send(&app, Method::GET, &uri, Some("other-key"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(&app, Method::DELETE, &uri, Some("other-key"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_offline_changes_replay_against_server() {
        use omnipa_core::{
            AddItemsRequest, CreateListRequest, HttpRemote, MemoryStore, NetworkMonitor,
            NetworkStatus, NewItem, ShoppingSync,
        };

        let (app, _dir) = setup().await;
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move { axum::serve(listener, app).await });

        let remote = HttpRemote::new(format!("http://{}", addr), KEY);
        let sync = ShoppingSync::builder(Arc::new(remote), Arc::new(MemoryStore::new()))
            .build(NetworkStatus::Offline);
        let monitor = NetworkMonitor::new(NetworkStatus::Offline);
        let _connectivity = sync.observe(&monitor);

        // Offline: a new list and an item on it, both provisional
        let created = sync
            .dispatcher()
            .create_list(CreateListRequest::new("Groceries"))
            .await
            .unwrap();
        let local_list = omnipa_core::RecordId::Local(created.pending().unwrap().provisional_ids[0]);
        sync.dispatcher()
            .add_items(AddItemsRequest::new(
                local_list,
                vec![NewItem::new("Milk")],
            ))
            .await
            .unwrap();
        assert_eq!(sync.pending_changes_count(None), 2);

        // Back online
        let status = monitor
            .probe(&format!("http://{}", addr), std::time::Duration::from_secs(2))
            .await;
        assert_eq!(status, NetworkStatus::Online);
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while sync.is_offline() {
                tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let report = sync.sync_now().await;
        assert_eq!(report.synced, 2);
        assert!(!sync.has_pending_changes(None));

        let lists = sync.queries().lists().await.unwrap();
        assert_eq!(lists.len(), 1);
        assert!(!lists[0].id.is_local());
        let detail = sync.queries().list_detail(&lists[0].id).await.unwrap();
        assert_eq!(detail.items.len(), 1);
        assert_eq!(detail.items[0].name, "Milk");

        server.abort();
    }
}
