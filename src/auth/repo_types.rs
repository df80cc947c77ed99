use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;

/// Authority granted to every signed-in user.
pub const ROLE_USER: &str = "ROLE_USER";

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // None for accounts created through OAuth2
    pub nickname: Option<String>,
    pub created_at: OffsetDateTime,
}

impl User {
    pub fn is_enabled(&self) -> bool {
        true
    }

    pub fn authorities(&self) -> Vec<&'static str> {
        vec![ROLE_USER]
    }
}

/// Fields supplied when creating a user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub nickname: Option<String>,
}

/// The single live refresh token of a user.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshToken {
    pub id: i64,
    pub user_id: i64,
    pub refresh_token: String,
}
