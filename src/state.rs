use std::sync::Arc;

use crate::{
    articles::{
        repo::{ArticleStore, PgArticleStore},
        services::ArticleService,
    },
    auth::{
        jwt::TokenProvider,
        oauth::{HttpOAuth2Client, OAuth2Client},
        repo::{PgRefreshTokenStore, PgUserStore, RefreshTokenStore, UserStore},
        services::{reissue_ttl, LoginSuccessHandler, TokenService, UserService},
    },
    config::AppConfig,
    db,
    memory::MemoryStore,
};

#[derive(Clone)]
pub struct AppState {
    pub tokens: TokenProvider,
    pub users: UserService,
    pub token_service: TokenService,
    pub login_success: LoginSuccessHandler,
    pub articles: ArticleService,
    pub oauth: Option<Arc<dyn OAuth2Client>>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = AppConfig::from_env()?;
        let oauth = config
            .oauth
            .clone()
            .map(|cfg| Arc::new(HttpOAuth2Client::new(cfg)) as Arc<dyn OAuth2Client>);

        let Some(database_url) = config.database_url.clone() else {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            let store = Arc::new(MemoryStore::default());
            return Ok(Self::from_parts(&config, store.clone(), store.clone(), store, oauth));
        };

        let pool = db::connect(&database_url).await?;
        db::run_migrations(&pool).await?;
        Ok(Self::from_parts(
            &config,
            Arc::new(PgUserStore::new(pool.clone())),
            Arc::new(PgRefreshTokenStore::new(pool.clone())),
            Arc::new(PgArticleStore::new(pool)),
            oauth,
        ))
    }

    /// Wires every service from its explicit dependencies.
    pub fn from_parts(
        config: &AppConfig,
        users: Arc<dyn UserStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        articles: Arc<dyn ArticleStore>,
        oauth: Option<Arc<dyn OAuth2Client>>,
    ) -> Self {
        let tokens = TokenProvider::from_config(&config.jwt);
        let token_service = TokenService::new(
            tokens.clone(),
            refresh_tokens.clone(),
            users.clone(),
            reissue_ttl(&config.jwt),
        );
        let login_success = LoginSuccessHandler::new(
            tokens.clone(),
            refresh_tokens,
            &config.jwt,
            config.login_redirect_path.clone(),
        );

        Self {
            tokens,
            users: UserService::new(users),
            token_service,
            login_success,
            articles: ArticleService::new(articles),
            oauth,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> AppConfig {
    AppConfig {
        database_url: None,
        jwt: crate::config::JwtConfig {
            secret: "test-secret".into(),
            issuer: "test-issuer".into(),
            ttl_minutes: 60 * 24,
            refresh_ttl_minutes: 60 * 24 * 14,
            reissue_ttl_minutes: 120,
        },
        login_redirect_path: "/articles".into(),
        oauth: None,
    }
}
