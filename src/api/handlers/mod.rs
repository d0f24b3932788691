//! API handlers and shared response helpers.
//!
//! Every JSON error body has the shape `{"error": "..."}`; validation failures
//! add a `details` array. Infrastructure failures never leak detail to the
//! client: they are logged here and answered with a generic 503.

pub mod auth;
pub mod health;
pub mod notes;
pub mod root;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::error;
use url::Url;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(ToSchema, Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct ValidationErrorResponse {
    pub error: String,
    pub details: Vec<String>,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct CreatedResponse {
    pub id: String,
}

#[derive(ToSchema, Serialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

pub(crate) fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
        }),
    )
        .into_response()
}

pub(crate) fn validation_error(details: Vec<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ValidationErrorResponse {
            error: "Validation error".to_string(),
            details,
        }),
    )
        .into_response()
}

/// Log a store failure server-side and answer with a detail-free 503.
pub(crate) fn store_unavailable(context: &str, err: &StoreError) -> Response {
    error!("{context}: {err}");
    error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
}

pub(crate) fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageResponse {
            message: message.to_string(),
        }),
    )
        .into_response()
}

/// Parse a path id, answering 400 with a validation body when it is not a UUID.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, Response> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| validation_error(vec!["id must be a valid UUID".to_string()]))
}

/// Lightweight email sanity check.
pub fn valid_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|re| re.is_match(email))
}

/// Absolute http(s) URL check used for avatar and profile links.
pub fn valid_http_url(value: &str) -> bool {
    Url::parse(value).is_ok_and(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
}

/// Trim an optional string, mapping blank values to `None`.
pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Read a required, non-blank string field from a JSON body.
pub(crate) fn required_string(
    body: &Map<String, Value>,
    field: &str,
    details: &mut Vec<String>,
) -> Option<String> {
    match body.get(field) {
        Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            details.push(format!("{field} is required"));
            None
        }
        Some(_) => {
            details.push(format!("{field} must be a string"));
            None
        }
    }
}

/// Read an optional string field; `null` counts as absent.
pub(crate) fn optional_string(
    body: &Map<String, Value>,
    field: &str,
    details: &mut Vec<String>,
) -> Option<String> {
    match body.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(_) => {
            details.push(format!("{field} must be a string"));
            None
        }
    }
}
