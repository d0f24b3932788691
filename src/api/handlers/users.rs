//! Users resource.
//!
//! Records are normally created by GitHub login; these routes let a logged-in
//! caller inspect and administer them. Deleting a user also removes their
//! sessions and notes.

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;
use utoipa::ToSchema;

use super::{
    auth::ExternalProfile,
    error_response, message_response, optional_string, parse_id, required_string,
    store_unavailable, valid_email, valid_http_url, validation_error, CreatedResponse,
    ErrorResponse, MessageResponse, ValidationErrorResponse,
};
use crate::store::{GithubProfile, SharedStore, StoreError, User, UserPatch};

/// Body accepted by `POST /users`.
#[derive(ToSchema, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub github_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

/// Body accepted by `PUT /users/{id}`; at least one field is required.
#[derive(ToSchema, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

enum ServiceError {
    BadRequest(Vec<String>),
    NotFound,
    Conflict,
    Store(StoreError),
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict => Self::Conflict,
            err @ StoreError::Unavailable(_) => Self::Store(err),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(details) => validation_error(details),
            Self::NotFound => error_response(StatusCode::NOT_FOUND, "User not found"),
            Self::Conflict => error_response(
                StatusCode::CONFLICT,
                "A user with this githubId already exists",
            ),
            Self::Store(err) => store_unavailable("Failed to handle user request", &err),
        }
    }
}

fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ServiceError> {
    body.map(|Json(body)| body)
        .map_err(|_| ServiceError::BadRequest(vec!["body must be valid JSON".to_string()]))
}

fn check_email(email: Option<&str>, details: &mut Vec<String>) {
    if email.is_some_and(|email| !valid_email(email)) {
        details.push("email must be a valid email address".to_string());
    }
}

fn check_url(field: &str, value: Option<&str>, details: &mut Vec<String>) {
    if value.is_some_and(|value| !valid_http_url(value)) {
        details.push(format!("{field} must be a valid URL"));
    }
}

fn validate_create_body(body: &Value) -> Result<GithubProfile, Vec<String>> {
    let Some(body) = body.as_object() else {
        return Err(vec!["body must be a JSON object".to_string()]);
    };
    let mut details = Vec::new();

    let github_id = required_string(body, "githubId", &mut details);
    let username = required_string(body, "username", &mut details);
    let display_name = optional_string(body, "displayName", &mut details);
    let email = optional_string(body, "email", &mut details);
    let avatar_url = optional_string(body, "avatarUrl", &mut details);
    let profile_url = optional_string(body, "profileUrl", &mut details);

    check_email(email.as_deref(), &mut details);
    check_url("avatarUrl", avatar_url.as_deref(), &mut details);
    check_url("profileUrl", profile_url.as_deref(), &mut details);

    let (Some(github_id), Some(username)) = (github_id, username) else {
        return Err(details);
    };
    if !details.is_empty() {
        return Err(details);
    }

    // Same defaults as a GitHub login.
    ExternalProfile {
        external_id: github_id,
        username,
        display_name,
        email,
        avatar_url,
        profile_url,
    }
    .normalize()
    .map_err(|err| vec![err.to_string()])
}

fn validate_update_body(body: &Value) -> Result<UserPatch, Vec<String>> {
    let Some(body) = body.as_object() else {
        return Err(vec!["body must be a JSON object".to_string()]);
    };
    let mut details = Vec::new();

    let patch = UserPatch {
        display_name: optional_string(body, "displayName", &mut details),
        email: optional_string(body, "email", &mut details),
        avatar_url: optional_string(body, "avatarUrl", &mut details),
    };
    check_email(patch.email.as_deref(), &mut details);
    check_url("avatarUrl", patch.avatar_url.as_deref(), &mut details);

    if !details.is_empty() {
        return Err(details);
    }
    if patch.is_empty() {
        return Err(vec!["No updates provided.".to_string()]);
    }
    Ok(patch)
}

#[utoipa::path(
    get,
    path = "/users",
    responses(
        (status = 200, description = "All users, newest first", body = [User]),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 503, description = "Service unavailable", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "users"
)]
pub async fn list_users(Extension(store): Extension<SharedStore>) -> Response {
    match store.list_users().await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 400, description = "Invalid id", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "users"
)]
pub async fn get_user(Path(id): Path<String>, Extension(store): Extension<SharedStore>) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match store.find_user(id).await {
        Ok(Some(user)) => (StatusCode::OK, Json(user)).into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = CreatedResponse),
        (status = 400, description = "Validation error", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 409, description = "githubId already registered", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "users"
)]
pub async fn create_user(
    Extension(store): Extension<SharedStore>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let profile = match json_body(body)
        .and_then(|body| validate_create_body(&body).map_err(ServiceError::BadRequest))
    {
        Ok(profile) => profile,
        Err(err) => return err.into_response(),
    };
    match store.insert_user(&profile, Utc::now()).await {
        Ok(user) => {
            info!(user_id = %user.id, github_id = %user.github_id, "User created");
            (
                StatusCode::CREATED,
                Json(CreatedResponse {
                    id: user.id.to_string(),
                }),
            )
                .into_response()
        }
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id (UUID)")),
    request_body = UpdateUserRequest,
    responses(
        (status = 204, description = "User updated"),
        (status = 400, description = "Validation error", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "users"
)]
pub async fn update_user(
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let patch = match json_body(body)
        .and_then(|body| validate_update_body(&body).map_err(ServiceError::BadRequest))
    {
        Ok(patch) => patch,
        Err(err) => return err.into_response(),
    };
    match store.update_user(id, &patch).await {
        Ok(Some(_)) => StatusCode::NO_CONTENT.into_response(),
        Ok(None) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    params(("id" = String, Path, description = "User id (UUID)")),
    responses(
        (status = 200, description = "User deleted", body = MessageResponse),
        (status = 400, description = "Invalid id", body = ValidationErrorResponse),
        (status = 401, description = "Not logged in", body = ErrorResponse),
        (status = 404, description = "User not found", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "users"
)]
pub async fn delete_user(
    Path(id): Path<String>,
    Extension(store): Extension<SharedStore>,
) -> Response {
    let id = match parse_id(&id) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match store.delete_user(id).await {
        Ok(true) => {
            info!(user_id = %id, "User deleted");
            message_response(StatusCode::OK, "User deleted")
        }
        Ok(false) => ServiceError::NotFound.into_response(),
        Err(err) => ServiceError::from(err).into_response(),
    }
}
