use crate::{
    api::{
        self,
        handlers::auth::{AuthConfig, AuthState, GithubConfig, GithubProvider},
    },
    store,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub base_url: String,
    pub github_client_id: String,
    pub github_client_secret: SecretString,
    pub callback_url: String,
    pub session_ttl_seconds: i64,
    pub store_timeout_seconds: u64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be reached, the GitHub client cannot be
/// built, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let timeout = Duration::from_secs(args.store_timeout_seconds);

    let store = store::connect(&args.dsn, timeout)
        .await
        .context("Failed to initialize store")?;

    debug!(
        base_url = %args.base_url,
        callback_url = %args.callback_url,
        "Configuring GitHub login"
    );

    let provider = GithubProvider::new(GithubConfig {
        client_id: args.github_client_id,
        client_secret: args.github_client_secret,
        callback_url: args.callback_url,
        timeout: Duration::from_secs(10),
    })
    .context("Failed to build GitHub client")?;

    let auth_config =
        AuthConfig::new(args.base_url).with_session_ttl_seconds(args.session_ttl_seconds);
    let auth_state = AuthState::new(auth_config, Arc::new(provider));

    api::new(args.port, store, auth_state).await
}
