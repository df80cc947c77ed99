use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::debug;

use crate::{
    auth::{
        claims::{Claims, Principal},
        repo_types::{User, ROLE_USER},
    },
    config::JwtConfig,
    state::AppState,
};

/// Signs and verifies HS256 tokens with the shared secret.
#[derive(Clone)]
pub struct TokenProvider {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
}

impl FromRef<AppState> for TokenProvider {
    fn from_ref(state: &AppState) -> Self {
        state.tokens.clone()
    }
}

impl TokenProvider {
    pub fn new(secret: &str, issuer: impl Into<String>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
        }
    }

    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self::new(&cfg.secret, cfg.issuer.clone())
    }

    pub fn generate_token(&self, user: &User, ttl: Duration) -> anyhow::Result<String> {
        let now = OffsetDateTime::now_utc();
        let expiry = i64::try_from(ttl.as_secs())
            .ok()
            .and_then(|secs| now.checked_add(TimeDuration::seconds(secs)))
            .context("token expiry out of range")?;
        self.sign(user, now, expiry)
    }

    #[cfg(test)]
    pub(crate) fn make_token(&self, user: &User, expiry: OffsetDateTime) -> anyhow::Result<String> {
        self.sign(user, OffsetDateTime::now_utc(), expiry)
    }

    fn sign(
        &self,
        user: &User,
        issued_at: OffsetDateTime,
        expiry: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let claims = Claims {
            iss: self.issuer.clone(),
            iat: issued_at.unix_timestamp() as usize,
            exp: expiry.unix_timestamp().max(0) as usize,
            sub: user.email.clone(),
            id: user.id,
        };
        // Header::default() is HS256 with `typ: JWT`.
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = user.id, exp = claims.exp, "jwt signed");
        Ok(token)
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_aud = false;
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        validation
    }

    /// Verifies signature, issuer and expiry, then returns the claim set.
    pub fn decode(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())?;
        Ok(data.claims)
    }

    pub fn valid_token(&self, token: &str) -> bool {
        match self.decode(token) {
            Ok(_) => true,
            Err(e) => {
                let reason = match e.kind() {
                    ErrorKind::ExpiredSignature => "expired",
                    ErrorKind::InvalidSignature => "bad signature",
                    ErrorKind::InvalidIssuer => "foreign issuer",
                    _ => "malformed",
                };
                debug!(reason, error = %e, "jwt rejected");
                false
            }
        }
    }

    pub fn get_authentication(&self, token: &str) -> anyhow::Result<Principal> {
        let claims = self.decode(token)?;
        Ok(Principal {
            user_id: claims.id,
            email: claims.sub,
            authorities: vec![ROLE_USER.to_string()],
        })
    }
}

#[cfg(test)]
pub(crate) fn test_user(id: i64, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        password_hash: None,
        nickname: None,
        created_at: OffsetDateTime::now_utc(),
    }
}
