use axum::{extract::OriginalUri, http::Method, Json};

use crate::error::AppError;
use crate::utils::ApiResponse;

pub const WELCOME_MESSAGE: &str = "Welcome to the API! Use /api/v1 endpoints.";

pub async fn welcome() -> Json<ApiResponse<()>> {
    Json(ApiResponse::message(WELCOME_MESSAGE))
}

/// Catch-all for requests no route matched. Uses the full original path,
/// also when reached from inside a nested router.
pub async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::not_found_route(method.as_str(), uri.path())
}
