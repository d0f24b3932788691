//! External identity provider (GitHub OAuth web flow).
//!
//! Flow Overview:
//! 1) `authorize_url` sends the browser to GitHub with a random `state`.
//! 2) GitHub redirects back with `code` + `state`.
//! 3) `exchange` trades the code for an access token and reads the profile.
//!
//! The handshake is stateless on our side apart from the `state` cookie; no
//! session exists until the profile has been persisted.

use async_trait::async_trait;
use reqwest::{header::ACCEPT, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

const GITHUB_AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const GITHUB_TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const GITHUB_API_URL: &str = "https://api.github.com";
const GITHUB_SCOPE: &str = "user:email";
const GITHUB_ACCEPT: &str = "application/vnd.github+json";

/// Profile as reported by the provider, before defaults are applied.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalProfile {
    pub external_id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    /// The provider answered but refused the code (expired, reused, wrong client).
    #[error("provider rejected the authorization: {0}")]
    Rejected(String),
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start the handshake.
    fn authorize_url(&self, state: &str) -> String;

    /// Complete the handshake for the `code` returned on the callback.
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, ProviderError>;
}

#[derive(Clone, Debug)]
pub struct GithubConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub callback_url: String,
    pub timeout: Duration,
}

#[derive(Debug)]
pub struct GithubProvider {
    client: Client,
    client_id: String,
    client_secret: SecretString,
    callback_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    email: Option<String>,
    avatar_url: Option<String>,
    html_url: Option<String>,
}

#[derive(Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GithubProvider {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GithubConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            client_id: config.client_id,
            client_secret: config.client_secret,
            callback_url: config.callback_url,
        })
    }

    async fn access_token(&self, code: &str) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "client_id": self.client_id,
            "client_secret": self.client_secret.expose_secret(),
            "code": code,
            "redirect_uri": self.callback_url,
        });

        let response: TokenResponse = self
            .client
            .post(GITHUB_TOKEN_URL)
            .header(ACCEPT, "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        token_from_response(response)
    }

    async fn primary_email(&self, token: &str) -> Result<Option<String>, ProviderError> {
        let emails: Vec<GithubEmail> = self
            .client
            .get(format!("{GITHUB_API_URL}/user/emails"))
            .header(ACCEPT, GITHUB_ACCEPT)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(pick_email(emails))
    }
}

fn token_from_response(response: TokenResponse) -> Result<String, ProviderError> {
    if let Some(error) = response.error {
        let detail = response.error_description.unwrap_or_default();
        return Err(ProviderError::Rejected(format!("{error} {detail}").trim().to_string()));
    }
    response
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ProviderError::InvalidResponse("missing access_token".to_string()))
}

fn pick_email(emails: Vec<GithubEmail>) -> Option<String> {
    let mut verified = emails.into_iter().filter(|email| email.verified);
    let first = verified.next()?;
    if first.primary {
        return Some(first.email);
    }
    verified
        .find(|email| email.primary)
        .map_or(Some(first.email), |email| Some(email.email))
}

impl From<GithubUser> for ExternalProfile {
    fn from(user: GithubUser) -> Self {
        Self {
            external_id: user.id.to_string(),
            username: user.login,
            display_name: user.name,
            email: user.email,
            avatar_url: user.avatar_url,
            profile_url: user.html_url,
        }
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn authorize_url(&self, state: &str) -> String {
        // The base URL is a constant, so parsing cannot fail; fall back to the raw string anyway.
        Url::parse_with_params(
            GITHUB_AUTHORIZE_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.callback_url.as_str()),
                ("scope", GITHUB_SCOPE),
                ("state", state),
            ],
        )
        .map_or_else(|_| GITHUB_AUTHORIZE_URL.to_string(), String::from)
    }

    #[instrument(skip_all)]
    async fn exchange(&self, code: &str) -> Result<ExternalProfile, ProviderError> {
        let token = self.access_token(code).await?;

        let user: GithubUser = self
            .client
            .get(format!("{GITHUB_API_URL}/user"))
            .header(ACCEPT, GITHUB_ACCEPT)
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let mut profile = ExternalProfile::from(user);

        // Private emails only show up on /user/emails; a failure there is not fatal.
        if profile.email.is_none() {
            match self.primary_email(&token).await {
                Ok(email) => profile.email = email,
                Err(err) => debug!("Failed to read GitHub emails: {err}"),
            }
        }

        Ok(profile)
    }
}
