use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// Persisted principal record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub github_id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: String,
    pub created_at: DateTime<Utc>,
    pub last_login: DateTime<Utc>,
}

/// Normalized identity fields written on login or manual creation.
///
/// Optional provider fields are resolved to their defaults before a value of
/// this type exists, so stores never see blank strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GithubProfile {
    pub github_id: String,
    pub username: String,
    pub display_name: String,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: String,
}

impl GithubProfile {
    pub(crate) fn into_user(self, id: Uuid, now: DateTime<Utc>) -> User {
        User {
            id,
            github_id: self.github_id,
            username: self.username,
            display_name: self.display_name,
            email: self.email,
            avatar_url: self.avatar_url,
            profile_url: self.profile_url,
            created_at: now,
            last_login: now,
        }
    }
}

/// Administrative profile edit; `None` keeps the stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
}

impl UserPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.email.is_none() && self.avatar_url.is_none()
    }
}

/// A note owned by the principal that created it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub is_pinned: bool,
    pub created_at: DateTime<Utc>,
}

/// Validated note body for create and replace.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NoteInput {
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub is_pinned: bool,
}
