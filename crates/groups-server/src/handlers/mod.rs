pub mod articles;
pub mod groups;

use axum::{extract::OriginalUri, http::Method};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;

/// Validates an `:id` path segment.
pub fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| {
        AppError::BadRequest(format!("Invalid parameter `id` with value `{}`.", raw))
    })
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, AppError> {
    serde_json::to_value(value).map_err(|e| AppError::Internal(e.into()))
}

/// Fallback for requests that match no route or no method of a route.
pub async fn not_found(method: Method, OriginalUri(uri): OriginalUri) -> AppError {
    AppError::NotFound(format!("Cannot {} {}", method, uri.path()))
}
