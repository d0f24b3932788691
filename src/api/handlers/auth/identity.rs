//! Identity store adapter: turn a provider profile into a persisted principal.
//!
//! Flow Overview: normalize the provider fields, then hand the result to the
//! store's atomic upsert keyed by the GitHub id. The first login creates the
//! record; later logins refresh the profile fields and `last_login`.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, instrument};

use super::provider::ExternalProfile;
use crate::{
    api::handlers::normalize_optional,
    store::{GithubProfile, StoreError, User, UserStore},
};

const GITHUB_PROFILE_BASE: &str = "https://github.com/";

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("invalid provider profile: {0}")]
    InvalidProfile(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ExternalProfile {
    /// Apply defaults to the optional provider fields.
    ///
    /// `display_name` falls back to the username and `profile_url` to the public
    /// GitHub page. Blank email/avatar values are dropped.
    pub(crate) fn normalize(self) -> Result<GithubProfile, LoginError> {
        let github_id = self.external_id.trim().to_string();
        if github_id.is_empty() {
            return Err(LoginError::InvalidProfile("missing provider id"));
        }
        let username = self.username.trim().to_string();
        if username.is_empty() {
            return Err(LoginError::InvalidProfile("missing username"));
        }

        let display_name =
            normalize_optional(self.display_name).unwrap_or_else(|| username.clone());
        let profile_url = normalize_optional(self.profile_url)
            .unwrap_or_else(|| format!("{GITHUB_PROFILE_BASE}{username}"));

        Ok(GithubProfile {
            github_id,
            username,
            display_name,
            email: normalize_optional(self.email),
            avatar_url: normalize_optional(self.avatar_url),
            profile_url,
        })
    }
}

/// Create or refresh the principal for `profile`.
///
/// # Errors
/// Returns [`LoginError::InvalidProfile`] when the provider omitted the id or
/// username, and [`LoginError::Store`] when the store call fails.
#[instrument(skip_all, fields(github_id = %profile.external_id))]
pub async fn upsert_principal<S>(
    users: &S,
    profile: ExternalProfile,
    now: DateTime<Utc>,
) -> Result<User, LoginError>
where
    S: UserStore + ?Sized,
{
    let profile = profile.normalize()?;
    let user = users.upsert_github_user(&profile, now).await?;
    debug!(user_id = %user.id, "Principal upserted");
    Ok(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;

    fn alice(display_name: &str) -> ExternalProfile {
        ExternalProfile {
            external_id: "1".to_string(),
            username: "alice".to_string(),
            display_name: Some(display_name.to_string()),
            email: Some("a@x.io".to_string()),
            avatar_url: None,
            profile_url: None,
        }
    }

    #[test]
    fn normalize_applies_defaults() {
        let profile = ExternalProfile {
            external_id: " 7 ".to_string(),
            username: "bob".to_string(),
            display_name: Some("   ".to_string()),
            email: Some(String::new()),
            ..ExternalProfile::default()
        };
        let normalized = profile.normalize().ok();
        let normalized = normalized.as_ref();
        assert_eq!(normalized.map(|p| p.github_id.as_str()), Some("7"));
        assert_eq!(normalized.map(|p| p.display_name.as_str()), Some("bob"));
        assert_eq!(
            normalized.map(|p| p.profile_url.as_str()),
            Some("https://github.com/bob")
        );
        assert_eq!(normalized.and_then(|p| p.email.clone()), None);
    }

    #[test]
    fn normalize_rejects_missing_identity() {
        let missing_id = ExternalProfile {
            username: "bob".to_string(),
            ..ExternalProfile::default()
        };
        assert!(matches!(
            missing_id.normalize(),
            Err(LoginError::InvalidProfile(_))
        ));

        let missing_username = ExternalProfile {
            external_id: "7".to_string(),
            ..ExternalProfile::default()
        };
        assert!(matches!(
            missing_username.normalize(),
            Err(LoginError::InvalidProfile(_))
        ));
    }

    #[tokio::test]
    async fn first_login_creates_then_second_updates() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let t1 = Utc::now();
        let first = upsert_principal(&store, alice("A"), t1).await?;
        assert_eq!(first.display_name, "A");
        assert_eq!(first.created_at, t1);
        assert_eq!(first.last_login, t1);

        let t2 = t1 + Duration::seconds(30);
        let second = upsert_principal(&store, alice("A2"), t2).await?;
        assert_eq!(second.id, first.id);
        assert_eq!(second.display_name, "A2");
        assert_eq!(second.created_at, t1);
        assert_eq!(second.last_login, t2);
        assert_eq!(store.list_users().await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn invalid_profile_never_touches_the_store() -> anyhow::Result<()> {
        let store = MemoryStore::new();
        let result = upsert_principal(&store, ExternalProfile::default(), Utc::now()).await;
        assert!(matches!(result, Err(LoginError::InvalidProfile(_))));
        assert!(store.list_users().await?.is_empty());
        Ok(())
    }
}
