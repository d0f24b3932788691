//! Notes resource.
//!
//! Every route here sits behind the authentication gate. Notes are stamped
//! with the caller's id at creation and every later access is scoped to that
//! owner: a note that belongs to someone else is reported as not found.

mod types;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use super::{
    error_response, message_response, parse_id, store_unavailable, validation_error,
    CreatedResponse, ErrorResponse, MessageResponse, ValidationErrorResponse,
};
use crate::{
    api::handlers::auth::Principal,
    store::{Note, NoteInput, SharedStore, StoreError},
};

pub use types::NoteRequest;
use types::validate_note_body;

enum ServiceError {
    BadRequest(Vec<String>),
    NotFound,
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(details) => validation_error(details),
            Self::NotFound => error_response(StatusCode::NOT_FOUND, "Note not found"),
            Self::Store(err) => store_unavailable("Failed to handle note request", &err),
        }
    }
}

fn note_body(body: Result<Json<Value>, JsonRejection>) -> Result<NoteInput, ServiceError> {
    let Json(body) =
        body.map_err(|_| ServiceError::BadRequest(vec!["body must be valid JSON".to_string()]))?;
    validate_note_body(&body).map_err(ServiceError::BadRequest)
}

#[utoipa::path(
    get,
    path = "/notes",
    responses(
        (status = 200, description = "Caller's notes, newest first", body = [Note]),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 503, description = "Service unavailable", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "notes"
)]
pub async fn list_notes(
    Extension(principal): Extension<Principal>,
    Extension(store): Extension<SharedStore>,
) -> Response {
    match store.list_notes(principal.id()).await {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id (UUID)")),
    responses(
        (status = 200, description = "Note", body = Note),
        (status = 400, description = "Invalid id", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "notes"
)]
pub async fn get_note(
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
    Extension(store): Extension<SharedStore>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match store.find_note(principal.id(), id).await {
        Ok(Some(note)) => (StatusCode::OK, Json(note)).into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/notes",
    request_body = NoteRequest,
    responses(
        (status = 201, description = "Note created", body = CreatedResponse),
        (status = 400, description = "Validation error", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "notes"
)]
pub async fn create_note(
    Extension(principal): Extension<Principal>,
    Extension(store): Extension<SharedStore>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let input = match note_body(body) {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };
    match store.insert_note(principal.id(), &input, Utc::now()).await {
        Ok(note) => {
            info!(note_id = %note.id, user_id = %principal.id(), "Note created");
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    id: note.id.to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id (UUID)")),
    request_body = NoteRequest,
    responses(
        (status = 204, description = "Note updated"),
        (status = 400, description = "Validation error", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "notes"
)]
pub async fn update_note(
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
    Extension(store): Extension<SharedStore>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let input = match note_body(body) {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };
    match store.update_note(principal.id(), id, &input).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/notes/{id}",
    params(("id" = String, Path, description = "Note id (UUID)")),
    responses(
        (status = 200, description = "Note deleted", body = MessageResponse),
        (status = 400, description = "Invalid id", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "Note not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "notes"
)]
pub async fn delete_note(
    Path(id): Path<String>,
    Extension(principal): Extension<Principal>,
    Extension(store): Extension<SharedStore>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match store.delete_note(principal.id(), id).await {
        Ok(true) => message_response(StatusCode::OK, "Note deleted"),
        Ok(false) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[cfg(test)]
mod tests;
