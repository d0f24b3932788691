//! Auth handlers and supporting modules.
//!
//! This module owns GitHub login, session management and the gate that
//! protects the notes and users resources.
//!
//! ## Request pipeline
//!
//! 1. [`resolve_principal`] runs on every request. A live session attaches a
//!    [`Principal`] to the request; anything else leaves the request anonymous.
//! 2. [`require_principal`] is layered on protected routes only and answers
//!    401 before the handler runs when no principal is attached.
//!
//! ## Sessions
//!
//! Session tokens are 32 random bytes (base64url). Only the SHA-256 hash is
//! persisted, with the owning user id and an absolute expiry
//! (`--session-ttl-seconds`, one week by default).

pub(crate) mod github;
mod identity;
pub(crate) mod principal;
mod provider;
pub(crate) mod session;
mod state;
mod utils;

pub use principal::{require_principal, Principal};
pub use provider::{ExternalProfile, GithubConfig, GithubProvider, IdentityProvider, ProviderError};
pub use session::{resolve_principal, SESSION_COOKIE_NAME};
pub use state::{AuthConfig, AuthState};
