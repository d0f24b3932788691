//! Helpers for driving the full router in tests.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header::CONTENT_TYPE, header::COOKIE, Method, Request},
    response::Response,
    Router,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tower::ServiceExt;

use super::auth::{
    session::{start_session, SESSION_COOKIE_NAME},
    AuthConfig, AuthState, ExternalProfile, IdentityProvider, ProviderError,
};
use crate::store::{
    GithubProfile, MemoryStore, Note, NoteInput, NoteStore, SessionStore, SharedStore, Store,
    StoreError, User, UserPatch, UserStore,
};
use uuid::Uuid;

pub(crate) const TEST_BASE_URL: &str = "http://localhost:8080";

/// Identity provider that answers with a fixed profile, or rejects every code.
pub(crate) struct StubProvider {
    profile: Option<ExternalProfile>,
    exchanges: AtomicUsize,
}

impl StubProvider {
    pub(crate) fn returning(profile: ExternalProfile) -> Self {
        Self {
            profile: Some(profile),
            exchanges: AtomicUsize::new(0),
        }
    }

    pub(crate) fn rejecting() -> Self {
        Self {
            profile: None,
            exchanges: AtomicUsize::new(0),
        }
    }

    pub(crate) fn exchanges(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StubProvider {
    fn authorize_url(&self, state: &str) -> String {
        format!("https://github.test/login/oauth/authorize?state={state}")
    }

    async fn exchange(&self, _code: &str) -> Result<ExternalProfile, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        self.profile
            .clone()
            .ok_or_else(|| ProviderError::Rejected("bad_verification_code".to_string()))
    }
}

/// Store whose backend is down: every call fails with [`StoreError::Unavailable`].
///
/// With `sessions_only` the user and note calls go to an in-memory store and
/// only session reads and writes fail.
pub(crate) struct FailingStore {
    inner: MemoryStore,
    sessions_only: bool,
}

impl FailingStore {
    pub(crate) fn everything() -> Self {
        Self {
            inner: MemoryStore::new(),
            sessions_only: false,
        }
    }

    pub(crate) fn sessions_only() -> Self {
        Self {
            inner: MemoryStore::new(),
            sessions_only: true,
        }
    }

    fn records(&self) -> Result<&MemoryStore, StoreError> {
        if self.sessions_only {
            Ok(&self.inner)
        } else {
            Err(unavailable())
        }
    }
}

fn unavailable() -> StoreError {
    StoreError::Unavailable(sqlx::Error::PoolTimedOut)
}

#[async_trait]
impl UserStore for FailingStore {
    async fn upsert_github_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.records()?.upsert_github_user(profile, now).await
    }

    async fn insert_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        self.records()?.insert_user(profile, now).await
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        self.records()?.find_user(id).await
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.records()?.list_users().await
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        self.records()?.update_user(id, patch).await
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        self.records()?.delete_user(id).await
    }
}

#[async_trait]
impl SessionStore for FailingStore {
    async fn insert_session(
        &self,
        _token_hash: &[u8],
        _user_id: Uuid,
        _expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn lookup_session(
        &self,
        _token_hash: &[u8],
        _now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        Err(unavailable())
    }

    async fn delete_session(&self, _token_hash: &[u8]) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn purge_expired_sessions(&self, _now: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(unavailable())
    }
}

#[async_trait]
impl NoteStore for FailingStore {
    async fn list_notes(&self, owner_id: Uuid) -> Result<Vec<Note>, StoreError> {
        self.records()?.list_notes(owner_id).await
    }

    async fn find_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>, StoreError> {
        self.records()?.find_note(owner_id, id).await
    }

    async fn insert_note(
        &self,
        owner_id: Uuid,
        input: &NoteInput,
        now: DateTime<Utc>,
    ) -> Result<Note, StoreError> {
        self.records()?.insert_note(owner_id, input, now).await
    }

    async fn update_note(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: &NoteInput,
    ) -> Result<bool, StoreError> {
        self.records()?.update_note(owner_id, id, input).await
    }

    async fn delete_note(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        self.records()?.delete_note(owner_id, id).await
    }
}

#[async_trait]
impl Store for FailingStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Err(unavailable())
    }

    async fn close(&self) {}
}

pub(crate) fn memory_store() -> SharedStore {
    Arc::new(MemoryStore::new())
}

pub(crate) fn test_app(store: SharedStore) -> Result<Router> {
    test_app_with_provider(store, Arc::new(StubProvider::rejecting()))
}

pub(crate) fn test_app_with_provider(
    store: SharedStore,
    provider: Arc<dyn IdentityProvider>,
) -> Result<Router> {
    let auth_state = AuthState::new(AuthConfig::new(TEST_BASE_URL.to_string()), provider);
    crate::api::app(store, Arc::new(auth_state))
}

/// Create (or refresh) a user and open a session for it; returns the `Cookie` header value.
pub(crate) async fn login(store: &SharedStore, github_id: &str, username: &str) -> Result<(User, String)> {
    let profile = GithubProfile {
        github_id: github_id.to_string(),
        username: username.to_string(),
        display_name: username.to_string(),
        email: None,
        avatar_url: None,
        profile_url: format!("https://github.com/{username}"),
    };
    let now = Utc::now();
    let user = store.upsert_github_user(&profile, now).await?;
    let token = start_session(store.as_ref(), user.id, 3600, now).await?;
    Ok((user, format!("{SESSION_COOKIE_NAME}={token}")))
}

pub(crate) fn request(
    method: Method,
    uri: &str,
    cookie: Option<&str>,
    body: Option<Value>,
) -> Result<Request<Body>> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(cookie) = cookie {
        builder = builder.header(COOKIE, cookie);
    }
    let body = match body {
        Some(body) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&body)?)
        }
        None => Body::empty(),
    };
    Ok(builder.body(body)?)
}

pub(crate) async fn send(app: &Router, request: Request<Body>) -> Result<Response> {
    Ok(app.clone().oneshot(request).await?)
}

pub(crate) async fn body_json(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Every `Set-Cookie` value on a response.
pub(crate) fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(axum::http::header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok().map(str::to_string))
        .collect()
}
