use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::auth::repo_types::{NewUser, RefreshToken, User};

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn create(&self, user: NewUser) -> anyhow::Result<User>;
    async fn update_nickname(&self, id: i64, nickname: &str) -> anyhow::Result<User>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Replace the user's refresh token, inserting a record on first login.
    async fn upsert(&self, user_id: i64, refresh_token: &str) -> anyhow::Result<RefreshToken>;
    async fn find_by_user_id(&self, user_id: i64) -> anyhow::Result<Option<RefreshToken>>;
    async fn find_by_refresh_token(&self, refresh_token: &str)
        -> anyhow::Result<Option<RefreshToken>>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, nickname, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find user by id")?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, nickname, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await
        .context("find user by email")?;
        Ok(user)
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, nickname)
            VALUES ($1, $2, $3)
            RETURNING id, email, password_hash, nickname, created_at
            "#,
        )
        .bind(user.email)
        .bind(user.password_hash)
        .bind(user.nickname)
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn update_nickname(&self, id: i64, nickname: &str) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users SET nickname = $2
            WHERE id = $1
            RETURNING id, email, password_hash, nickname, created_at
            "#,
        )
        .bind(id)
        .bind(nickname)
        .fetch_one(&self.db)
        .await
        .context("update user nickname")?;
        Ok(user)
    }
}

#[derive(Clone)]
pub struct PgRefreshTokenStore {
    db: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn upsert(&self, user_id: i64, refresh_token: &str) -> anyhow::Result<RefreshToken> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"
            INSERT INTO refresh_tokens (user_id, refresh_token)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET refresh_token = EXCLUDED.refresh_token
            RETURNING id, user_id, refresh_token
            "#,
        )
        .bind(user_id)
        .bind(refresh_token)
        .fetch_one(&self.db)
        .await
        .context("upsert refresh token")?;
        Ok(row)
    }

    async fn find_by_user_id(&self, user_id: i64) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"SELECT id, user_id, refresh_token FROM refresh_tokens WHERE user_id = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find refresh token by user")?;
        Ok(row)
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> anyhow::Result<Option<RefreshToken>> {
        let row = sqlx::query_as::<_, RefreshToken>(
            r#"SELECT id, user_id, refresh_token FROM refresh_tokens WHERE refresh_token = $1"#,
        )
        .bind(refresh_token)
        .fetch_optional(&self.db)
        .await
        .context("find refresh token by value")?;
        Ok(row)
    }
}
