//! GitHub login endpoints.
//!
//! Flow Overview:
//! 1) `/auth/github` stores a random `state` in a short-lived cookie and
//!    redirects to GitHub.
//! 2) `/auth/github/callback` checks `state`, exchanges the code, upserts the
//!    principal and issues a session cookie.
//! 3) Any provider-side failure lands on `/auth/failure`.

use axum::{
    extract::{Extension, Query},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::IntoParams;

use super::{
    identity::{upsert_principal, LoginError},
    session::{session_cookie, start_session},
    state::AuthState,
    utils::{constant_time_eq, cookie, generate_token, read_cookie},
};
use crate::{
    api::handlers::{error_response, store_unavailable, ErrorResponse},
    store::SharedStore,
};

pub const OAUTH_STATE_COOKIE_NAME: &str = "notes_oauth_state";
pub(crate) const FAILURE_PATH: &str = "/auth/failure";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct CallbackQuery {
    /// Authorization code issued by GitHub.
    pub code: Option<String>,
    /// Echo of the `state` sent on the authorize redirect.
    pub state: Option<String>,
    /// Set by GitHub when the user denied consent.
    pub error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/auth/github",
    responses(
        (status = 303, description = "Redirect to the GitHub authorize page")
    ),
    tag = "auth"
)]
pub async fn github_login(Extension(auth_state): Extension<Arc<AuthState>>) -> Response {
    let state = match generate_token() {
        Ok(state) => state,
        Err(err) => {
            error!("Failed to generate OAuth state: {err}");
            return error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable");
        }
    };

    let config = auth_state.config();
    let mut response = Redirect::to(&auth_state.provider().authorize_url(&state)).into_response();
    match cookie(
        OAUTH_STATE_COOKIE_NAME,
        &state,
        config.oauth_state_ttl_seconds(),
        config.cookie_secure(),
    ) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
            response
        }
        Err(err) => {
            error!("Failed to build OAuth state cookie: {err}");
            error_response(StatusCode::SERVICE_UNAVAILABLE, "Service unavailable")
        }
    }
}

#[utoipa::path(
    get,
    path = "/auth/github/callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Logged in, redirect to / with a session cookie"),
        (status = 503, description = "Service unavailable", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn github_callback(
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
    Extension(store): Extension<SharedStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Response {
    let config = auth_state.config();
    // The state cookie is single use; clear it on every outcome.
    let clear_state = cookie(OAUTH_STATE_COOKIE_NAME, "", 0, config.cookie_secure()).ok();
    let with_cleared_state = |mut response: Response| {
        if let Some(value) = clear_state.clone() {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    };

    if let Some(error) = query.error.as_deref() {
        warn!("GitHub returned an authorization error: {error}");
        return with_cleared_state(Redirect::to(FAILURE_PATH).into_response());
    }

    let expected = read_cookie(&headers, OAUTH_STATE_COOKIE_NAME);
    let state_ok = match (expected.as_deref(), query.state.as_deref()) {
        (Some(expected), Some(received)) => constant_time_eq(expected, received),
        _ => false,
    };
    if !state_ok {
        warn!("OAuth state mismatch");
        return with_cleared_state(Redirect::to(FAILURE_PATH).into_response());
    }

    let Some(code) = query.code.as_deref().filter(|code| !code.is_empty()) else {
        warn!("OAuth callback without code");
        return with_cleared_state(Redirect::to(FAILURE_PATH).into_response());
    };

    let profile = match auth_state.provider().exchange(code).await {
        Ok(profile) => profile,
        Err(err) => {
            warn!("GitHub exchange failed: {err}");
            return with_cleared_state(Redirect::to(FAILURE_PATH).into_response());
        }
    };

    let now = Utc::now();
    let user = match upsert_principal(store.as_ref(), profile, now).await {
        Ok(user) => user,
        Err(LoginError::InvalidProfile(reason)) => {
            warn!("Rejected GitHub profile: {reason}");
            return with_cleared_state(Redirect::to(FAILURE_PATH).into_response());
        }
        Err(LoginError::Store(err)) => {
            return with_cleared_state(store_unavailable("Failed to upsert user", &err));
        }
    };

    let token = match start_session(store.as_ref(), user.id, config.session_ttl_seconds(), now).await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err}");
            return with_cleared_state(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable",
            ));
        }
    };

    let session = match session_cookie(config, &token) {
        Ok(value) => value,
        Err(err) => {
            error!("Failed to build session cookie: {err}");
            return with_cleared_state(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "Service unavailable",
            ));
        }
    };

    info!(user_id = %user.id, username = %user.username, "User logged in");
    let mut response = Redirect::to("/").into_response();
    response.headers_mut().append(SET_COOKIE, session);
    with_cleared_state(response)
}

#[utoipa::path(
    get,
    path = "/auth/failure",
    responses(
        (status = 401, description = "GitHub authentication failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn auth_failure() -> Response {
    error_response(StatusCode::UNAUTHORIZED, "GitHub authentication failed")
}
