use anyhow::Context;
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use reqwest::Url;
use serde::Deserialize;
use tracing::debug;

use crate::config::OAuthConfig;

/// Seconds the authorization-request state cookie stays valid.
pub const AUTH_REQUEST_TTL_SECS: u64 = 180;

/// Identity asserted by the provider after a successful code exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthProfile {
    pub email: String,
    pub name: Option<String>,
}

#[async_trait]
pub trait OAuth2Client: Send + Sync {
    /// Provider URL the browser is sent to, carrying `state`.
    fn authorization_url(&self, state: &str) -> anyhow::Result<String>;
    /// Exchanges the authorization code and fetches the user's profile.
    async fn fetch_profile(&self, code: &str) -> anyhow::Result<OAuthProfile>;
}

pub fn new_state() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Authorization-code client for OpenID-style providers (Google by default).
pub struct HttpOAuth2Client {
    http: reqwest::Client,
    cfg: OAuthConfig,
}

impl HttpOAuth2Client {
    pub fn new(cfg: OAuthConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            cfg,
        }
    }
}

#[async_trait]
impl OAuth2Client for HttpOAuth2Client {
    fn authorization_url(&self, state: &str) -> anyhow::Result<String> {
        let url = Url::parse_with_params(
            &self.cfg.authorization_uri,
            &[
                ("response_type", "code"),
                ("client_id", self.cfg.client_id.as_str()),
                ("redirect_uri", self.cfg.redirect_uri.as_str()),
                ("scope", self.cfg.scope.as_str()),
                ("state", state),
            ],
        )
        .context("oauth2 authorization uri")?;
        Ok(url.to_string())
    }

    async fn fetch_profile(&self, code: &str) -> anyhow::Result<OAuthProfile> {
        let token: TokenResponse = self
            .http
            .post(&self.cfg.token_uri)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.cfg.redirect_uri.as_str()),
                ("client_id", self.cfg.client_id.as_str()),
                ("client_secret", self.cfg.client_secret.as_str()),
            ])
            .send()
            .await
            .context("oauth2 token request")?
            .error_for_status()
            .context("oauth2 token response")?
            .json()
            .await
            .context("oauth2 token body")?;

        let profile: OAuthProfile = self
            .http
            .get(&self.cfg.user_info_uri)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("oauth2 userinfo request")?
            .error_for_status()
            .context("oauth2 userinfo response")?
            .json()
            .await
            .context("oauth2 userinfo body")?;
        debug!(email = %profile.email, "oauth2 profile fetched");
        Ok(profile)
    }
}
