//! # Notes (REST API with GitHub login)
//!
//! `notes` is a small note-taking service. Users sign in through GitHub; the
//! first successful login creates their record and later logins refresh it.
//!
//! ## Authentication
//!
//! Login follows the GitHub OAuth web flow. On success the service issues an
//! opaque session token in the `notes_session` cookie and stores only its
//! SHA-256 hash together with the user id and an expiry. Every request passes
//! through a resolver that turns a live session into a principal; protected
//! routes are wrapped in a gate that answers `401` when there is none.
//!
//! ## Ownership
//!
//! Notes are stamped with the creating user's id. Reads, updates and deletes
//! of a note owned by someone else return `404 Not Found` rather than
//! `403 Forbidden` so note ids cannot be probed.
//!
//! ## Storage
//!
//! Postgres (`postgres://…`) in production; `memory://` selects an in-process
//! store for local development and tests.

pub mod api;
pub mod cli;
pub mod store;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn git_commit_hash_is_hex_or_unknown() {
        if GIT_COMMIT_HASH == "unknown" {
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(GIT_COMMIT_HASH.len() >= 7);
    }

    #[test]
    fn app_user_agent_has_name_and_version() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
