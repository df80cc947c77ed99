use std::{sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::{
    auth::{
        jwt::TokenProvider,
        password::{hash_password, verify_password, MIN_PASSWORD_LEN},
        repo::{RefreshTokenStore, UserStore},
        repo_types::{NewUser, User},
    },
    config::JwtConfig,
    cookies::{self, OAUTH2_AUTH_REQUEST_COOKIE, REFRESH_TOKEN_COOKIE},
    error::{ApiError, TokenError},
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Oversized values saturate; minting with them then fails with an
/// out-of-range expiry instead of panicking.
fn minutes(m: i64) -> Duration {
    (m.max(0) as u64)
        .checked_mul(60)
        .map(Duration::from_secs)
        .unwrap_or(Duration::MAX)
}

/// Appends `token=<value>` to a redirect path that may already carry a query.
fn with_token_param(path: &str, token: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{path}{sep}token={token}")
}

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Signs up a local account.
    #[instrument(skip(self, password))]
    pub async fn save(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!(%email, "invalid email");
            return Err(ApiError::BadRequest("Invalid email".into()));
        }
        if password.len() < MIN_PASSWORD_LEN {
            warn!("password too short");
            return Err(ApiError::BadRequest("Password too short".into()));
        }
        if self.users.find_by_email(&email).await?.is_some() {
            warn!(%email, "email already registered");
            return Err(ApiError::Conflict("Email already registered".into()));
        }

        let user = self
            .users
            .create(NewUser {
                email,
                password_hash: Some(hash_password(password)?),
                nickname: None,
            })
            .await?;
        info!(user_id = user.id, email = %user.email, "user registered");
        Ok(user)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<User, ApiError> {
        self.users
            .find_by_id(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Unexpected user".into()))
    }

    /// Resolves form-login credentials to an enabled user.
    #[instrument(skip(self, password))]
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = email.trim().to_lowercase();
        let invalid = || ApiError::Unauthorized("Invalid credentials".into());

        let Some(user) = self.users.find_by_email(&email).await? else {
            warn!(%email, "login unknown email");
            return Err(invalid());
        };
        if !verify_password(password, user.password_hash.as_deref())? {
            warn!(%email, user_id = user.id, "login invalid password");
            return Err(invalid());
        }
        if !user.is_enabled() {
            warn!(user_id = user.id, "login on disabled account");
            return Err(invalid());
        }
        Ok(user)
    }

    /// Creates the account on first OAuth2 login; afterwards keeps the
    /// nickname in sync with the provider's display name.
    #[instrument(skip(self))]
    pub async fn save_or_update_oauth(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<User, ApiError> {
        let email = email.trim().to_lowercase();
        match self.users.find_by_email(&email).await? {
            Some(user) => match name {
                Some(name) if user.nickname.as_deref() != Some(name) => {
                    Ok(self.users.update_nickname(user.id, name).await?)
                }
                _ => Ok(user),
            },
            None => {
                let user = self
                    .users
                    .create(NewUser {
                        email,
                        password_hash: None,
                        nickname: name.map(str::to_string),
                    })
                    .await?;
                info!(user_id = user.id, "user registered through oauth2");
                Ok(user)
            }
        }
    }
}

/// Exchanges a stored refresh token for a fresh access token.
#[derive(Clone)]
pub struct TokenService {
    tokens: TokenProvider,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserStore>,
    access_ttl: Duration,
}

impl TokenService {
    pub fn new(
        tokens: TokenProvider,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserStore>,
        access_ttl: Duration,
    ) -> Self {
        Self {
            tokens,
            refresh_tokens,
            users,
            access_ttl,
        }
    }

    #[instrument(skip_all)]
    pub async fn create_new_access_token(&self, refresh_token: &str) -> Result<String, TokenError> {
        if !self.tokens.valid_token(refresh_token) {
            return Err(TokenError::InvalidToken);
        }

        // The user id comes from the store record, not from the token's claims.
        let record = self
            .refresh_tokens
            .find_by_refresh_token(refresh_token)
            .await?
            .ok_or(TokenError::TokenNotFound)?;

        let user = self
            .users
            .find_by_id(record.user_id)
            .await?
            .ok_or(TokenError::UserNotFound)?;

        let token = self.tokens.generate_token(&user, self.access_ttl)?;
        info!(user_id = user.id, refresh_token_id = record.id, "access token reissued");
        Ok(token)
    }
}

/// Tokens minted for a successful login and where to send the browser.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub refresh_token: String,
    pub target_url: String,
}

#[derive(Clone)]
pub struct LoginSuccessHandler {
    tokens: TokenProvider,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    redirect_path: String,
}

impl LoginSuccessHandler {
    pub fn new(
        tokens: TokenProvider,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        jwt: &JwtConfig,
        redirect_path: impl Into<String>,
    ) -> Self {
        Self {
            tokens,
            refresh_tokens,
            access_ttl: minutes(jwt.ttl_minutes),
            refresh_ttl: minutes(jwt.refresh_ttl_minutes),
            redirect_path: redirect_path.into(),
        }
    }

    /// Mints the refresh token, makes it the user's only live one, and
    /// mints the access token for the redirect.
    /// Two logins of one user within the same second yield identical tokens.
    #[instrument(skip(self, user), fields(user_id = user.id))]
    pub async fn issue(&self, user: &User) -> Result<LoginOutcome, ApiError> {
        let refresh_token = self.tokens.generate_token(user, self.refresh_ttl)?;
        self.refresh_tokens.upsert(user.id, &refresh_token).await?;

        let access_token = self.tokens.generate_token(user, self.access_ttl)?;
        let target_url = with_token_param(&self.redirect_path, &access_token);
        debug!("login tokens issued");

        Ok(LoginOutcome {
            refresh_token,
            target_url,
        })
    }

    pub async fn on_authentication_success(
        &self,
        user: &User,
        request_headers: &HeaderMap,
    ) -> Result<Response, ApiError> {
        let outcome = self.issue(user).await?;

        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            cookies::build(
                REFRESH_TOKEN_COOKIE,
                &outcome.refresh_token,
                self.refresh_ttl.as_secs(),
            )?,
        );
        if cookies::read(request_headers, OAUTH2_AUTH_REQUEST_COOKIE).is_some() {
            headers.append(SET_COOKIE, cookies::expire(OAUTH2_AUTH_REQUEST_COOKIE));
        }
        headers.insert(
            LOCATION,
            HeaderValue::from_str(&outcome.target_url).context("redirect url")?,
        );

        info!(user_id = user.id, "login succeeded");
        Ok((StatusCode::FOUND, headers).into_response())
    }
}

pub(crate) fn reissue_ttl(jwt: &JwtConfig) -> Duration {
    minutes(jwt.reissue_ttl_minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::jwt::test_user, memory::MemoryStore};
    use time::{Duration as TimeDuration, OffsetDateTime};

    fn jwt_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            ttl_minutes: 60 * 24,
            refresh_ttl_minutes: 60 * 24 * 14,
            reissue_ttl_minutes: 120,
        }
    }

    struct Fixture {
        store: Arc<MemoryStore>,
        tokens: TokenProvider,
        token_service: TokenService,
        login: LoginSuccessHandler,
        users: UserService,
    }

    fn fixture() -> Fixture {
        let cfg = jwt_config();
        let store = Arc::new(MemoryStore::default());
        let tokens = TokenProvider::from_config(&cfg);
        Fixture {
            token_service: TokenService::new(
                tokens.clone(),
                store.clone(),
                store.clone(),
                reissue_ttl(&cfg),
            ),
            login: LoginSuccessHandler::new(tokens.clone(), store.clone(), &cfg, "/articles"),
            users: UserService::new(store.clone()),
            tokens,
            store,
        }
    }

    async fn signed_up(f: &Fixture) -> User {
        f.users
            .save("user@gmail.com", "test-password")
            .await
            .expect("signup")
    }

    #[tokio::test]
    async fn refresh_returns_access_token_for_stored_user() {
        let f = fixture();
        let user = signed_up(&f).await;
        assert_eq!(user.id, 1);

        let refresh = f
            .tokens
            .generate_token(&user, Duration::from_secs(14 * 24 * 3600))
            .unwrap();
        f.store.upsert(user.id, &refresh).await.unwrap();

        let access = f
            .token_service
            .create_new_access_token(&refresh)
            .await
            .expect("new access token");
        let claims = f.tokens.decode(&access).expect("decode");
        assert_eq!(claims.id, 1);
        assert_eq!(claims.sub, "user@gmail.com");
        assert_eq!(claims.exp - claims.iat, 2 * 60 * 60);
    }

    #[tokio::test]
    async fn refresh_rejects_token_that_was_never_stored() {
        let f = fixture();
        let user = signed_up(&f).await;
        let refresh = f.tokens.generate_token(&user, Duration::from_secs(600)).unwrap();

        let err = f.token_service.create_new_access_token(&refresh).await.unwrap_err();
        assert!(matches!(err, TokenError::TokenNotFound));
    }

    #[tokio::test]
    async fn refresh_rejects_superseded_token() {
        let f = fixture();
        let user = signed_up(&f).await;
        let old = f
            .tokens
            .make_token(&user, OffsetDateTime::now_utc() + TimeDuration::days(13))
            .unwrap();
        f.store.upsert(user.id, &old).await.unwrap();

        let outcome = f.login.issue(&user).await.unwrap();
        assert_ne!(outcome.refresh_token, old);

        let err = f.token_service.create_new_access_token(&old).await.unwrap_err();
        assert!(matches!(err, TokenError::TokenNotFound));
        assert!(f
            .token_service
            .create_new_access_token(&outcome.refresh_token)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn refresh_rejects_invalid_and_expired_tokens() {
        let f = fixture();
        let user = signed_up(&f).await;
        let expired = f
            .tokens
            .make_token(&user, OffsetDateTime::now_utc() - TimeDuration::days(1))
            .unwrap();
        f.store.upsert(user.id, &expired).await.unwrap();

        let err = f.token_service.create_new_access_token(&expired).await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken));

        let err = f.token_service.create_new_access_token("garbage").await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidToken));
    }

    #[tokio::test]
    async fn refresh_fails_when_user_is_gone() {
        let f = fixture();
        let ghost = test_user(99, "ghost@example.com");
        let refresh = f.tokens.generate_token(&ghost, Duration::from_secs(600)).unwrap();
        f.store.upsert(ghost.id, &refresh).await.unwrap();

        let err = f.token_service.create_new_access_token(&refresh).await.unwrap_err();
        assert!(matches!(err, TokenError::UserNotFound));
    }

    #[tokio::test]
    async fn second_login_invalidates_first_refresh_token() {
        let f = fixture();
        let user = signed_up(&f).await;

        let first = f.login.issue(&user).await.unwrap();
        // Tokens only differ by their second-resolution timestamps.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        let second = f.login.issue(&user).await.unwrap();

        assert!(f.tokens.valid_token(&first.refresh_token));
        let err = f
            .token_service
            .create_new_access_token(&first.refresh_token)
            .await
            .unwrap_err();
        assert!(matches!(err, TokenError::TokenNotFound));
        assert!(f
            .token_service
            .create_new_access_token(&second.refresh_token)
            .await
            .is_ok());

        let stored = f.store.find_by_user_id(user.id).await.unwrap().unwrap();
        assert_eq!(stored.refresh_token, second.refresh_token);
    }

    #[tokio::test]
    async fn login_response_sets_cookie_and_redirects_with_access_token() {
        let f = fixture();
        let user = signed_up(&f).await;

        let mut request_headers = HeaderMap::new();
        request_headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("oauth2_auth_request=state123"),
        );
        let res = f
            .login
            .on_authentication_success(&user, &request_headers)
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::FOUND);
        let location = res.headers()[LOCATION].to_str().unwrap().to_string();
        let access = location.strip_prefix("/articles?token=").expect("redirect path");
        assert_eq!(f.tokens.decode(access).unwrap().id, user.id);

        let cookies: Vec<_> = res
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let stored = f.store.find_by_user_id(user.id).await.unwrap().unwrap();
        assert!(cookies
            .iter()
            .any(|c| c.starts_with(&format!("refresh_token={};", stored.refresh_token))
                && c.contains("Max-Age=1209600")
                && c.contains("HttpOnly")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("oauth2_auth_request=;") && c.contains("Max-Age=0")));
    }

    #[test]
    fn token_param_respects_existing_query() {
        assert_eq!(with_token_param("/articles", "abc"), "/articles?token=abc");
        assert_eq!(
            with_token_param("/articles?tab=new", "abc"),
            "/articles?tab=new&token=abc"
        );
    }

    #[tokio::test]
    async fn redirect_path_with_query_keeps_single_question_mark() {
        let cfg = jwt_config();
        let store = Arc::new(MemoryStore::default());
        let login = LoginSuccessHandler::new(
            TokenProvider::from_config(&cfg),
            store.clone(),
            &cfg,
            "/articles?tab=new",
        );
        let user = UserService::new(store)
            .save("user@gmail.com", "test-password")
            .await
            .unwrap();

        let outcome = login.issue(&user).await.unwrap();
        assert!(outcome.target_url.starts_with("/articles?tab=new&token="));
        assert_eq!(outcome.target_url.matches('?').count(), 1);
    }

    #[test]
    fn oversized_minutes_saturate_instead_of_overflowing() {
        assert_eq!(minutes(i64::MAX), Duration::MAX);
        assert_eq!(minutes(-5), Duration::ZERO);
        assert_eq!(minutes(120), Duration::from_secs(7200));
    }

    #[tokio::test]
    async fn oversized_ttl_config_fails_login_without_panicking() {
        let cfg = JwtConfig {
            refresh_ttl_minutes: i64::MAX,
            ..jwt_config()
        };
        let store = Arc::new(MemoryStore::default());
        let login =
            LoginSuccessHandler::new(TokenProvider::from_config(&cfg), store.clone(), &cfg, "/articles");
        let user = UserService::new(store.clone())
            .save("user@gmail.com", "test-password")
            .await
            .unwrap();

        let err = login.issue(&user).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(store.find_by_user_id(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn signup_validates_and_rejects_duplicates() {
        let f = fixture();
        signed_up(&f).await;

        let err = f.users.save("USER@gmail.com ", "another-pass").await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        let err = f.users.save("not-an-email", "long-enough").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        let err = f.users.save("new@gmail.com", "short").await.unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[tokio::test]
    async fn authenticate_checks_password() {
        let f = fixture();
        let user = signed_up(&f).await;

        let found = f.users.authenticate("user@gmail.com", "test-password").await.unwrap();
        assert_eq!(found.id, user.id);
        let err = f.users.authenticate("user@gmail.com", "nope-nope").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
        let err = f.users.authenticate("who@gmail.com", "test-password").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn oauth_login_creates_then_updates_nickname() {
        let f = fixture();
        let created = f
            .users
            .save_or_update_oauth("oauth@gmail.com", Some("Yoon"))
            .await
            .unwrap();
        assert_eq!(created.nickname.as_deref(), Some("Yoon"));
        assert!(created.password_hash.is_none());

        let updated = f
            .users
            .save_or_update_oauth("oauth@gmail.com", Some("Yoonie"))
            .await
            .unwrap();
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.nickname.as_deref(), Some("Yoonie"));

        // OAuth-only accounts cannot use the password form.
        let err = f.users.authenticate("oauth@gmail.com", "whatever1").await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }
}
