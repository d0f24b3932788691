//! Postgres backend.
//!
//! The login upsert relies on `INSERT ... ON CONFLICT (github_id) DO UPDATE`,
//! which Postgres executes atomically against the `users_github_id_key`
//! constraint, so concurrent first logins never produce two rows.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, postgres::PgRow, Connection, PgPool, Row};
use std::time::Duration;
use tracing::{info_span, Instrument, Span};
use uuid::Uuid;

use super::{
    GithubProfile, Note, NoteInput, NoteStore, SessionStore, Store, StoreError, User, UserPatch,
    UserStore,
};

const SCHEMA_SQL: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/sql/schema.sql"));

const USER_COLUMNS: &str = "id, github_id, username, display_name, email, avatar_url, profile_url, created_at, last_login";

const NOTE_COLUMNS: &str = "id, owner_id, title, content, summary, tags, is_pinned, created_at";

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect a small pool; `timeout` bounds how long a request waits for a connection.
    ///
    /// # Errors
    /// Returns an error if the database cannot be reached.
    pub async fn connect(dsn: &str, timeout: Duration) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .acquire_timeout(timeout)
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .context("Failed to connect to database")?;

        Ok(Self { pool })
    }

    /// Apply `sql/schema.sql`; every statement is `IF NOT EXISTS`.
    ///
    /// # Errors
    /// Returns an error if any schema statement fails.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(query_span("DDL", "sql/schema.sql"))
            .await
            .context("Failed to apply database schema")?;
        Ok(())
    }
}

fn query_span(operation: &str, statement: &str) -> Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        github_id: row.try_get("github_id")?,
        username: row.try_get("username")?,
        display_name: row.try_get("display_name")?,
        email: row.try_get("email")?,
        avatar_url: row.try_get("avatar_url")?,
        profile_url: row.try_get("profile_url")?,
        created_at: row.try_get("created_at")?,
        last_login: row.try_get("last_login")?,
    })
}

fn note_from_row(row: &PgRow) -> Result<Note, sqlx::Error> {
    Ok(Note {
        id: row.try_get("id")?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        summary: row.try_get("summary")?,
        tags: row.try_get("tags")?,
        is_pinned: row.try_get("is_pinned")?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserStore for PgStore {
    async fn upsert_github_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let query = format!(
            r"
            INSERT INTO users
                (github_id, username, display_name, email, avatar_url, profile_url, created_at, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            ON CONFLICT ON CONSTRAINT users_github_id_key DO UPDATE SET
                username = EXCLUDED.username,
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                avatar_url = EXCLUDED.avatar_url,
                profile_url = EXCLUDED.profile_url,
                last_login = GREATEST(users.last_login, EXCLUDED.last_login)
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&profile.github_id)
            .bind(&profile.username)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(&profile.avatar_url)
            .bind(&profile.profile_url)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(query_span("UPSERT", &query))
            .await?;
        Ok(user_from_row(&row)?)
    }

    async fn insert_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let query = format!(
            r"
            INSERT INTO users
                (github_id, username, display_name, email, avatar_url, profile_url, created_at, last_login)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $7)
            RETURNING {USER_COLUMNS}
            "
        );
        let result = sqlx::query(&query)
            .bind(&profile.github_id)
            .bind(&profile.username)
            .bind(&profile.display_name)
            .bind(&profile.email)
            .bind(&profile.avatar_url)
            .bind(&profile.profile_url)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await;

        match result {
            Ok(row) => Ok(user_from_row(&row)?),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let query = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(user_from_row).collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let query = format!(
            r"
            UPDATE users
            SET
                display_name = COALESCE($1, display_name),
                email = COALESCE($2, email),
                avatar_url = COALESCE($3, avatar_url)
            WHERE id = $4
            RETURNING {USER_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(&patch.display_name)
            .bind(&patch.email)
            .bind(&patch.avatar_url)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(query_span("UPDATE", &query))
            .await?;
        Ok(row.as_ref().map(user_from_row).transpose()?)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        // Sessions and notes go with the user through ON DELETE CASCADE.
        let query = "DELETE FROM users WHERE id = $1";
        let result = sqlx::query(query)
            .bind(id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionStore for PgStore {
    async fn insert_session(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let query = r"
            INSERT INTO user_sessions (session_hash, user_id, expires_at)
            VALUES ($1, $2, $3)
        ";
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::Conflict),
            Err(err) => Err(err.into()),
        }
    }

    async fn lookup_session(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let query = r"
            SELECT user_id
            FROM user_sessions
            WHERE session_hash = $1
              AND expires_at > $2
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await?;
        Ok(row.map(|row| row.try_get::<Uuid, _>("user_id")).transpose()?)
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        let query = "DELETE FROM user_sessions WHERE session_hash = $1";
        sqlx::query(query)
            .bind(token_hash)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let query = "DELETE FROM user_sessions WHERE expires_at <= $1";
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl NoteStore for PgStore {
    async fn list_notes(&self, owner_id: Uuid) -> Result<Vec<Note>, StoreError> {
        let query =
            format!("SELECT {NOTE_COLUMNS} FROM notes WHERE owner_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query(&query)
            .bind(owner_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(rows.iter().map(note_from_row).collect::<Result<Vec<_>, sqlx::Error>>()?)
    }

    async fn find_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>, StoreError> {
        let query = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 AND owner_id = $2");
        let row = sqlx::query(&query)
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(note_from_row).transpose()?)
    }

    async fn insert_note(
        &self,
        owner_id: Uuid,
        input: &NoteInput,
        now: DateTime<Utc>,
    ) -> Result<Note, StoreError> {
        let query = format!(
            r"
            INSERT INTO notes (owner_id, title, content, summary, tags, is_pinned, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {NOTE_COLUMNS}
            "
        );
        let row = sqlx::query(&query)
            .bind(owner_id)
            .bind(&input.title)
            .bind(&input.content)
            .bind(&input.summary)
            .bind(&input.tags)
            .bind(input.is_pinned)
            .bind(now)
            .fetch_one(&self.pool)
            .instrument(query_span("INSERT", &query))
            .await?;
        Ok(note_from_row(&row)?)
    }

    async fn update_note(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: &NoteInput,
    ) -> Result<bool, StoreError> {
        let query = r"
            UPDATE notes
            SET title = $1, content = $2, summary = $3, tags = $4, is_pinned = $5
            WHERE id = $6 AND owner_id = $7
        ";
        let result = sqlx::query(query)
            .bind(&input.title)
            .bind(&input.content)
            .bind(&input.summary)
            .bind(&input.tags)
            .bind(input.is_pinned)
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_note(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM notes WHERE id = $1 AND owner_id = $2";
        let result = sqlx::query(query)
            .bind(id)
            .bind(owner_id)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let acquire_span = info_span!(
            "db.acquire",
            db.system = "postgresql",
            db.operation = "ACQUIRE"
        );
        let mut conn = self.pool.acquire().instrument(acquire_span).await?;
        let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
        conn.ping().instrument(ping_span).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
