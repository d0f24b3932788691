//! In-process store backed by hash maps behind a single `RwLock`.
//!
//! Every write holds the write lock for its whole read-modify-write, which is
//! what makes the login upsert atomic here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    GithubProfile, Note, NoteInput, NoteStore, SessionStore, Store, StoreError, User, UserPatch,
    UserStore,
};

#[derive(Debug)]
struct SessionEntry {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    users: HashMap<Uuid, User>,
    github_index: HashMap<String, Uuid>,
    sessions: HashMap<Vec<u8>, SessionEntry>,
    notes: HashMap<Uuid, Note>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, F>(items: &mut [T], key: F)
where
    F: Fn(&T) -> DateTime<Utc>,
{
    items.sort_by(|a, b| key(b).cmp(&key(a)));
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn upsert_github_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut state = self.state.write().await;

        if let Some(id) = state.github_index.get(&profile.github_id).copied() {
            if let Some(user) = state.users.get_mut(&id) {
                user.username.clone_from(&profile.username);
                user.display_name.clone_from(&profile.display_name);
                user.email.clone_from(&profile.email);
                user.avatar_url.clone_from(&profile.avatar_url);
                user.profile_url.clone_from(&profile.profile_url);
                user.last_login = user.last_login.max(now);
                return Ok(user.clone());
            }
        }

        let user = profile.clone().into_user(Uuid::new_v4(), now);
        state.github_index.insert(user.github_id.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn insert_user(
        &self,
        profile: &GithubProfile,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let mut state = self.state.write().await;
        if state.github_index.contains_key(&profile.github_id) {
            return Err(StoreError::Conflict);
        }
        let user = profile.clone().into_user(Uuid::new_v4(), now);
        state.github_index.insert(user.github_id.clone(), user.id);
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        newest_first(&mut users, |user| user.created_at);
        Ok(users)
    }

    async fn update_user(&self, id: Uuid, patch: &UserPatch) -> Result<Option<User>, StoreError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(display_name) = &patch.display_name {
            user.display_name.clone_from(display_name);
        }
        if let Some(email) = &patch.email {
            user.email = Some(email.clone());
        }
        if let Some(avatar_url) = &patch.avatar_url {
            user.avatar_url = Some(avatar_url.clone());
        }
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.remove(&id) else {
            return Ok(false);
        };
        state.github_index.remove(&user.github_id);
        state.sessions.retain(|_, session| session.user_id != id);
        state.notes.retain(|_, note| note.owner_id != id);
        Ok(true)
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(
        &self,
        token_hash: &[u8],
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if state.sessions.contains_key(token_hash) {
            return Err(StoreError::Conflict);
        }
        state.sessions.insert(
            token_hash.to_vec(),
            SessionEntry {
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn lookup_session(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, StoreError> {
        let mut state = self.state.write().await;
        let Some(session) = state.sessions.get(token_hash) else {
            return Ok(None);
        };
        if session.expires_at > now {
            return Ok(Some(session.user_id));
        }
        state.sessions.remove(token_hash);
        Ok(None)
    }

    async fn delete_session(&self, token_hash: &[u8]) -> Result<(), StoreError> {
        self.state.write().await.sessions.remove(token_hash);
        Ok(())
    }

    async fn purge_expired_sessions(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let before = state.sessions.len();
        state.sessions.retain(|_, session| session.expires_at > now);
        Ok(u64::try_from(before - state.sessions.len()).unwrap_or(u64::MAX))
    }
}

#[async_trait]
impl NoteStore for MemoryStore {
    async fn list_notes(&self, owner_id: Uuid) -> Result<Vec<Note>, StoreError> {
        let mut notes: Vec<Note> = self
            .state
            .read()
            .await
            .notes
            .values()
            .filter(|note| note.owner_id == owner_id)
            .cloned()
            .collect();
        newest_first(&mut notes, |note| note.created_at);
        Ok(notes)
    }

    async fn find_note(&self, owner_id: Uuid, id: Uuid) -> Result<Option<Note>, StoreError> {
        Ok(self
            .state
            .read()
            .await
            .notes
            .get(&id)
            .filter(|note| note.owner_id == owner_id)
            .cloned())
    }

    async fn insert_note(
        &self,
        owner_id: Uuid,
        input: &NoteInput,
        now: DateTime<Utc>,
    ) -> Result<Note, StoreError> {
        let note = Note {
            id: Uuid::new_v4(),
            owner_id,
            title: input.title.clone(),
            content: input.content.clone(),
            summary: input.summary.clone(),
            tags: input.tags.clone(),
            is_pinned: input.is_pinned,
            created_at: now,
        };
        self.state.write().await.notes.insert(note.id, note.clone());
        Ok(note)
    }

    async fn update_note(
        &self,
        owner_id: Uuid,
        id: Uuid,
        input: &NoteInput,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.notes.get_mut(&id) {
            Some(note) if note.owner_id == owner_id => {
                note.title.clone_from(&input.title);
                note.content.clone_from(&input.content);
                note.summary.clone_from(&input.summary);
                note.tags.clone_from(&input.tags);
                note.is_pinned = input.is_pinned;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete_note(&self, owner_id: Uuid, id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let owned = state
            .notes
            .get(&id)
            .is_some_and(|note| note.owner_id == owner_id);
        if owned {
            state.notes.remove(&id);
        }
        Ok(owned)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Context, Result};
    use chrono::Duration;
    use std::sync::Arc;

    fn profile(github_id: &str, username: &str) -> GithubProfile {
        GithubProfile {
            github_id: github_id.to_string(),
            username: username.to_string(),
            display_name: username.to_string(),
            email: None,
            avatar_url: None,
            profile_url: format!("https://github.com/{username}"),
        }
    }

    #[tokio::test]
    async fn upsert_creates_then_updates_same_record() -> Result<()> {
        let store = MemoryStore::new();
        let t0 = Utc::now();
        let t1 = t0 + Duration::seconds(30);

        let first = store.upsert_github_user(&profile("42", "alice"), t0).await?;
        assert_eq!(first.username, "alice");
        assert_eq!(first.created_at, t0);
        assert_eq!(first.last_login, t0);

        let second = store
            .upsert_github_user(&profile("42", "alice2"), t1)
            .await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.username, "alice2");
        assert_eq!(second.created_at, t0);
        assert_eq!(second.last_login, t1);
        assert_eq!(store.list_users().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn upsert_never_moves_last_login_backwards() -> Result<()> {
        let store = MemoryStore::new();
        let t1 = Utc::now();
        let t0 = t1 - Duration::seconds(5);

        store.upsert_github_user(&profile("7", "bob"), t1).await?;
        let late = store.upsert_github_user(&profile("7", "bob"), t0).await?;
        assert_eq!(late.last_login, t1);
        assert_eq!(late.created_at, t1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_first_logins_converge() -> Result<()> {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_github_user(&profile("99", "carol"), Utc::now())
                    .await
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await??.id);
        }
        ids.dedup();
        assert_eq!(ids.len(), 1);
        assert_eq!(store.list_users().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn insert_user_rejects_duplicate_github_id() -> Result<()> {
        let store = MemoryStore::new();
        store.insert_user(&profile("1", "dave"), Utc::now()).await?;
        let err = store.insert_user(&profile("1", "dave"), Utc::now()).await;
        assert!(matches!(err, Err(StoreError::Conflict)));
        Ok(())
    }

    #[tokio::test]
    async fn expired_sessions_are_invisible() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        store
            .insert_session(b"live", user_id, now + Duration::seconds(60))
            .await?;
        store
            .insert_session(b"stale", user_id, now - Duration::seconds(1))
            .await?;

        assert_eq!(store.lookup_session(b"live", now).await?, Some(user_id));
        assert_eq!(store.lookup_session(b"stale", now).await?, None);
        assert_eq!(store.lookup_session(b"missing", now).await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn purge_drops_only_expired_sessions() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        store
            .insert_session(b"live", user_id, now + Duration::seconds(60))
            .await?;
        store
            .insert_session(b"stale", user_id, now - Duration::seconds(1))
            .await?;
        store.insert_session(b"edge", user_id, now).await?;

        assert_eq!(store.purge_expired_sessions(now).await?, 2);
        assert_eq!(store.purge_expired_sessions(now).await?, 0);
        assert_eq!(store.state.read().await.sessions.len(), 1);
        assert_eq!(store.lookup_session(b"live", now).await?, Some(user_id));
        Ok(())
    }

    #[tokio::test]
    async fn delete_user_cascades() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let user = store.upsert_github_user(&profile("5", "erin"), now).await?;
        store
            .insert_session(b"token", user.id, now + Duration::seconds(60))
            .await?;
        let note = store
            .insert_note(
                user.id,
                &NoteInput {
                    title: "t".to_string(),
                    content: "c".to_string(),
                    ..NoteInput::default()
                },
                now,
            )
            .await?;

        assert!(store.delete_user(user.id).await?);
        assert!(!store.delete_user(user.id).await?);
        assert_eq!(store.lookup_session(b"token", now).await?, None);
        assert_eq!(store.find_note(user.id, note.id).await?, None);

        // The GitHub id is free again after deletion.
        let again = store.upsert_github_user(&profile("5", "erin"), now).await?;
        assert_ne!(again.id, user.id);
        Ok(())
    }

    #[tokio::test]
    async fn notes_are_scoped_to_owner() -> Result<()> {
        let store = MemoryStore::new();
        let now = Utc::now();
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        let input = NoteInput {
            title: "groceries".to_string(),
            content: "milk".to_string(),
            ..NoteInput::default()
        };
        let note = store.insert_note(owner, &input, now).await?;

        assert!(store.find_note(other, note.id).await?.is_none());
        assert!(!store.update_note(other, note.id, &input).await?);
        assert!(!store.delete_note(other, note.id).await?);
        assert!(store.list_notes(other).await?.is_empty());

        let found = store
            .find_note(owner, note.id)
            .await?
            .context("owner should see the note")?;
        assert_eq!(found.title, "groceries");
        assert!(store.delete_note(owner, note.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn list_notes_newest_first() -> Result<()> {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let t0 = Utc::now();
        let input = NoteInput {
            title: "a".to_string(),
            content: "b".to_string(),
            ..NoteInput::default()
        };
        let older = store.insert_note(owner, &input, t0).await?;
        let newer = store
            .insert_note(owner, &input, t0 + Duration::seconds(1))
            .await?;

        let ids: Vec<Uuid> = store
            .list_notes(owner)
            .await?
            .into_iter()
            .map(|note| note.id)
            .collect();
        assert_eq!(ids, vec![newer.id, older.id]);
        Ok(())
    }
}
