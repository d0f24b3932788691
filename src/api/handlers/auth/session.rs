//! Session issue, resolution and teardown.
//!
//! Sessions are opaque random tokens handed to the browser in the
//! `notes_session` cookie (or presented as `Authorization: Bearer`). Only the
//! SHA-256 of the token is stored, next to the principal reference and expiry.

use axum::{
    extract::{Extension, Request, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::{
    principal::Principal,
    state::{AuthConfig, AuthState},
    utils::{cookie, generate_token, hash_session_token, is_well_formed_token, read_cookie},
};
use crate::{
    api::handlers::{error_response, ErrorResponse},
    store::{SessionStore, SharedStore, Store, StoreError, User},
};

pub const SESSION_COOKIE_NAME: &str = "notes_session";

const START_SESSION_ATTEMPTS: usize = 3;

/// Issue a new session for `user_id` and return the raw token.
///
/// Expired sessions are purged first. A hash collision on insert surfaces as
/// a conflict; a fresh token is drawn and the insert retried.
///
/// # Errors
/// Returns an error if the expiry overflows, no random token can be generated
/// or the store rejects the insert.
pub(crate) async fn start_session<S>(
    sessions: &S,
    user_id: Uuid,
    ttl_seconds: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<String>
where
    S: SessionStore + ?Sized,
{
    let expires_at = Duration::try_seconds(ttl_seconds)
        .and_then(|ttl| now.checked_add_signed(ttl))
        .with_context(|| format!("session ttl of {ttl_seconds}s is out of range"))?;

    // Expired rows are swept on every login.
    match sessions.purge_expired_sessions(now).await {
        Ok(0) => {}
        Ok(purged) => debug!("Purged {purged} expired sessions"),
        Err(err) => warn!("Failed to purge expired sessions: {err}"),
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let token = generate_token()?;
        match sessions
            .insert_session(&hash_session_token(&token), user_id, expires_at)
            .await
        {
            Ok(()) => return Ok(token),
            Err(StoreError::Conflict) if attempt < START_SESSION_ATTEMPTS => {
                warn!("Session token collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Resolve the request's session into a principal.
///
/// Missing, malformed or expired tokens, and sessions whose user no longer
/// exists, all resolve to `None`. Store failures are logged and also resolve
/// to `None`, so an outage degrades to anonymous rather than failing requests
/// that do not need a principal.
pub(crate) async fn resolve<S>(headers: &HeaderMap, store: &S, now: DateTime<Utc>) -> Option<Principal>
where
    S: Store + ?Sized,
{
    let token = extract_session_token(headers)?;
    if !is_well_formed_token(&token) {
        debug!("Ignoring malformed session token");
        return None;
    }
    let token_hash = hash_session_token(&token);

    let user_id = match store.lookup_session(&token_hash, now).await {
        Ok(Some(user_id)) => user_id,
        Ok(None) => return None,
        Err(err) => {
            error!("Failed to lookup session: {err}");
            return None;
        }
    };

    match store.find_user(user_id).await {
        Ok(Some(user)) => Some(Principal { user }),
        Ok(None) => {
            debug!(%user_id, "Session references a missing user");
            None
        }
        Err(err) => {
            error!("Failed to load session user: {err}");
            None
        }
    }
}

/// Session principal resolver, layered on every route.
pub async fn resolve_principal(
    State(store): State<SharedStore>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(principal) = resolve(request.headers(), store.as_ref(), Utc::now()).await {
        request.extensions_mut().insert(principal);
    }
    next.run(request).await
}

#[utoipa::path(
    get,
    path = "/auth/profile",
    responses(
        (status = 200, description = "Logged-in user", body = User),
        (status = 401, description = "No active session", body = ErrorResponse)
    ),
    security(("session_cookie" = [])),
    tag = "auth"
)]
pub async fn profile(principal: Option<Extension<Principal>>) -> Response {
    match principal {
        Some(Extension(principal)) => (StatusCode::OK, Json(principal.user)).into_response(),
        None => error_response(StatusCode::UNAUTHORIZED, "Not logged in"),
    }
}

#[utoipa::path(
    get,
    path = "/auth/logout",
    responses(
        (status = 303, description = "Session cleared, redirect to /")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    Extension(store): Extension<SharedStore>,
    Extension(auth_state): Extension<Arc<AuthState>>,
) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = store.delete_session(&hash_session_token(&token)).await {
            error!("Failed to delete session: {err}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response = Redirect::to("/").into_response();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response.headers_mut().append(SET_COOKIE, cookie);
    }
    response
}

pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    cookie(
        SESSION_COOKIE_NAME,
        token,
        config.session_ttl_seconds(),
        config.cookie_secure(),
    )
}

fn clear_session_cookie(
    config: &AuthConfig,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    cookie(SESSION_COOKIE_NAME, "", 0, config.cookie_secure())
}

/// Bearer token first, then the session cookie.
pub(crate) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    extract_bearer_token(headers).or_else(|| read_cookie(headers, SESSION_COOKIE_NAME))
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
