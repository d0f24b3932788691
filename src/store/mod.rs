//! Persistence seam for principals, sessions and notes.
//!
//! Handlers never talk to a database directly; they hold a [`SharedStore`]
//! constructed once at startup and shared read-only for the life of the
//! process. Two backends exist:
//!
//! - [`PgStore`]: Postgres via `sqlx`, the production backend.
//! - [`MemoryStore`]: in-process maps for local development (`memory://`) and tests.
//!
//! ## Upsert on login
//!
//! [`UserStore::upsert_github_user`] is the only write path used by login. It
//! must be a single atomic create-or-update keyed by the GitHub id so that
//! concurrent first logins for the same identity converge to one record.

mod memory;
mod models;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use uuid::Uuid;

pub use memory::MemoryStore;
pub use models::{GithubProfile, Note, NoteInput, User, UserPatch};
pub use postgres::PgStore;

/// DSN scheme selecting the in-process store.
pub const MEMORY_DSN: &str = "memory://";

/// Process-wide store handle.
pub type SharedStore = Arc<dyn Store>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached or the call timed out. Retryable.
    #[error("store unavailable: {0}")]
    Unavailable(#[from] sqlx::Error),
    /// A uniqueness constraint rejected the write.
    #[error("record already exists")]
    Conflict,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Atomic create-or-update keyed by `profile.github_id`.
    ///
    /// On insert both timestamps are `now`. On update the profile fields are
    /// overwritten, `created_at` is kept and `last_login` never moves backwards.
    async fn upsert_github_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Plain insert used by manual user creation; duplicates are a [`StoreError::Conflict`].
    async fn insert_user(&self, profile: &GithubProfile, now: DateTime<Utc>)
        -> Result<User, StoreError>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError>;

    /// All users, newest first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Apply the provided fields; returns `None` when the user does not exist.
    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError>;

    /// Delete a user together with its sessions and notes.
    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Returns the principal reference of a live session; expired sessions are invisible.
    async fn lookup_session(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError>;

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError>;

    /// Drop every session that expired at or before `now`; returns how many went.
    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Note persistence. Every call is scoped to the owning principal: notes owned
/// by someone else behave exactly like missing notes.
#[async_trait]
pub trait NoteStore: Send + Sync {
    /// Owner's notes, newest first.
    async fn list_notes(&self, owner_id: Uuid) -> Result<Vec<Note>, StoreError>;

    async fn find_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>, StoreError>;

    async fn insert_note(
        &self,
        owner_id: Uuid,
        input: &NoteInput,
        now: DateTime<Utc>,
    ) -> Result<Note, StoreError>;

    async fn update_note(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: &NoteInput,
    ) -> Result<bool, StoreError>;

    async fn delete_note(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait Store: UserStore + SessionStore + NoteStore {
    /// Cheap liveness probe used by `/health`.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Release backend resources at shutdown.
    async fn close(&self);
}

/// Build the store selected by `dsn`.
///
/// # Errors
/// Returns an error if the Postgres pool cannot be created or the schema cannot be applied.
pub async fn connect(dsn: &str, timeout: Duration) -> anyhow::Result<SharedStore> {
    if dsn.starts_with(MEMORY_DSN) {
        tracing::warn!("Using in-memory store; data is lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    }

    let store = PgStore::connect(dsn, timeout).await?;
    store.ensure_schema().await?;
    Ok(Arc::new(store))
}
