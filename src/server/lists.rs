//! Shopping list and item handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};

use omnipa_core::{
    CreateListRequest, ItemBatch, ItemChanges, NewItem, ShoppingItem, ShoppingList,
    ShoppingListDetail,
};

use super::error::ApiError;
use super::AppState;
use crate::config::AuthUser;

pub const MAX_NAME_LEN: usize = 200;

/// Unwrap a JSON body, reporting malformed input as a validation error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::Validation(rejection.body_text()))
}

fn validate_name(what: &str, name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::Validation(format!("{} name is required", what)));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "{} name must be at most {} characters",
            what, MAX_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_amount(field: &str, value: Option<f64>) -> Result<(), ApiError> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(ApiError::Validation(format!(
            "{} must not be negative",
            field
        ))),
        _ => Ok(()),
    }
}

fn validate_item(item: NewItem) -> Result<NewItem, ApiError> {
    validate_amount("quantity", item.quantity)?;
    Ok(NewItem {
        name: validate_name("Item", &item.name)?,
        ..item
    })
}

fn validate_changes(mut changes: ItemChanges) -> Result<ItemChanges, ApiError> {
    if let Some(name) = &changes.name {
        changes.name = Some(validate_name("Item", name)?);
    }
    validate_amount("quantity", changes.quantity)?;
    validate_amount("actualPrice", changes.actual_price)?;
    Ok(changes)
}

fn list_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Shopping list {} not found", id))
}

pub async fn list_lists(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<ShoppingList>>, ApiError> {
    Ok(Json(state.lists.list(&user.user_id).await?))
}

pub async fn create_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    payload: Result<Json<CreateListRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShoppingList>), ApiError> {
    let request = body(payload)?;
    let name = validate_name("List", &request.name)?;
    let description = request
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty());

    let list = state
        .lists
        .create(&user.user_id, &name, description)
        .await?;
    tracing::info!(user = %user.user_id, list = %list.id, "Created shopping list");
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn get_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<ShoppingListDetail>, ApiError> {
    state
        .lists
        .get_detail(&user.user_id, &id)
        .await?
        .map(Json)
        .ok_or_else(|| list_not_found(&id))
}

pub async fn delete_list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.lists.archive(&user.user_id, &id).await? {
        tracing::info!(user = %user.user_id, list = %id, "Archived shopping list");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(list_not_found(&id))
    }
}

pub async fn add_items(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<ItemBatch>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<ShoppingItem>>), ApiError> {
    let batch = body(payload)?;
    if batch.items.is_empty() {
        return Err(ApiError::Validation(
            "At least one item is required".to_string(),
        ));
    }
    let items = batch
        .items
        .into_iter()
        .map(validate_item)
        .collect::<Result<Vec<_>, _>>()?;

    let created = state
        .lists
        .add_items(&user.user_id, &id, &items)
        .await?
        .ok_or_else(|| list_not_found(&id))?;
    tracing::info!(user = %user.user_id, list = %id, count = created.len(), "Added items");
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    payload: Result<Json<ItemChanges>, JsonRejection>,
) -> Result<Json<ShoppingItem>, ApiError> {
    let changes = validate_changes(body(payload)?)?;

    state
        .lists
        .update_item(&user.user_id, &id, &changes)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Shopping item {} not found", id)))
}
