//! Maps validated CLI arguments to the server action.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, ARG_DSN, ARG_PORT, ARG_STORE_TIMEOUT_SECONDS};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;
    let store_timeout_seconds = matches
        .get_one::<u64>(ARG_STORE_TIMEOUT_SECONDS)
        .copied()
        .unwrap_or(5);

    let base_url = matches
        .get_one::<String>(auth::ARG_BASE_URL)
        .cloned()
        .unwrap_or_else(|| "http://localhost:8080".to_string());
    let github_client_id = matches
        .get_one::<String>(auth::ARG_GITHUB_CLIENT_ID)
        .cloned()
        .context("missing required argument: --github-client-id")?;
    let github_client_secret = matches
        .get_one::<String>(auth::ARG_GITHUB_CLIENT_SECRET)
        .cloned()
        .map(SecretString::from)
        .context("missing required argument: --github-client-secret")?;
    let callback_url = matches
        .get_one::<String>(auth::ARG_CALLBACK_URL)
        .cloned()
        .unwrap_or_else(|| default_callback_url(&base_url));
    let session_ttl_seconds = matches
        .get_one::<i64>(auth::ARG_SESSION_TTL_SECONDS)
        .copied()
        .unwrap_or(604_800);

    Ok(Action::Server(Args {
        port,
        dsn,
        base_url,
        github_client_id,
        github_client_secret,
        callback_url,
        session_ttl_seconds,
        store_timeout_seconds,
    }))
}

fn default_callback_url(base_url: &str) -> String {
    format!("{}/auth/github/callback", base_url.trim_end_matches('/'))
}
