use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    /// Access token lifetime handed out at login.
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
    /// Access token lifetime handed out by `POST /api/token`.
    pub reissue_ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub authorization_uri: String,
    pub token_uri: String,
    pub user_info_uri: String,
    pub scope: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: Option<String>,
    pub jwt: JwtConfig,
    pub login_redirect_path: String,
    pub oauth: Option<OAuthConfig>,
}

fn env_minutes(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").ok();
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "inkwell".into()),
            ttl_minutes: env_minutes("JWT_TTL_MINUTES", 60 * 24),
            refresh_ttl_minutes: env_minutes("JWT_REFRESH_TTL_MINUTES", 60 * 24 * 14),
            reissue_ttl_minutes: env_minutes("JWT_REISSUE_TTL_MINUTES", 60 * 2),
        };
        let login_redirect_path =
            std::env::var("LOGIN_REDIRECT_PATH").unwrap_or_else(|_| "/articles".into());

        // OAuth2 login is only wired up when a client is registered.
        let oauth = match std::env::var("OAUTH2_CLIENT_ID") {
            Ok(client_id) => Some(OAuthConfig {
                client_id,
                client_secret: std::env::var("OAUTH2_CLIENT_SECRET")?,
                redirect_uri: std::env::var("OAUTH2_REDIRECT_URI")?,
                authorization_uri: std::env::var("OAUTH2_AUTHORIZATION_URI")
                    .unwrap_or_else(|_| "https://accounts.google.com/o/oauth2/v2/auth".into()),
                token_uri: std::env::var("OAUTH2_TOKEN_URI")
                    .unwrap_or_else(|_| "https://oauth2.googleapis.com/token".into()),
                user_info_uri: std::env::var("OAUTH2_USER_INFO_URI")
                    .unwrap_or_else(|_| "https://www.googleapis.com/oauth2/v3/userinfo".into()),
                scope: std::env::var("OAUTH2_SCOPE").unwrap_or_else(|_| "email profile".into()),
            }),
            Err(_) => None,
        };

        Ok(Self {
            database_url,
            jwt,
            login_redirect_path,
            oauth,
        })
    }
}
