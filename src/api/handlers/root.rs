use axum::{http::StatusCode, response::Response};

use super::error_response;

// axum handler for root
pub async fn root() -> &'static str {
    "Notes API is running"
}

/// Fallback for unknown routes.
pub async fn not_found() -> Response {
    error_response(StatusCode::NOT_FOUND, "Route not found")
}
