use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use super::error::ErrorBody;
use super::AppState;

fn unauthorized(error: &str, message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(ErrorBody { error, message })).into_response()
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let api_key = match auth_header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(key) => key,
            None => {
                return unauthorized(
                    "invalid_auth",
                    "Authorization header must use Bearer scheme",
                )
            }
        },
        None => return unauthorized("missing_auth", "Authorization header required"),
    };

    // Validate API key
    match state.api_keys.validate(api_key) {
        Some(user) => {
            // Add user info to request extensions
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        None => unauthorized("invalid_key", "Invalid API key"),
    }
}
