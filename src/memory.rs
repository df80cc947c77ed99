use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use crate::{
    articles::{
        repo::ArticleStore,
        repo_types::{Article, NewArticle},
    },
    auth::{
        repo::{RefreshTokenStore, UserStore},
        repo_types::{NewUser, RefreshToken, User},
    },
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    refresh_tokens: HashMap<i64, RefreshToken>, // keyed by user_id
    articles: BTreeMap<i64, Article>,
    next_user_id: i64,
    next_refresh_token_id: i64,
    next_article_id: i64,
}

/// Process-local backend with the same constraints as the Postgres schema.
/// Used by the tests and when no `DATABASE_URL` is configured.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

fn next(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_id(&self, id: i64) -> anyhow::Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create(&self, user: NewUser) -> anyhow::Result<User> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == user.email) {
            anyhow::bail!("duplicate email: {}", user.email);
        }
        if let Some(nickname) = &user.nickname {
            if tables.users.values().any(|u| u.nickname.as_ref() == Some(nickname)) {
                anyhow::bail!("duplicate nickname: {nickname}");
            }
        }
        let id = next(&mut tables.next_user_id);
        let created = User {
            id,
            email: user.email,
            password_hash: user.password_hash,
            nickname: user.nickname,
            created_at: OffsetDateTime::now_utc(),
        };
        tables.users.insert(id, created.clone());
        Ok(created)
    }

    async fn update_nickname(&self, id: i64, nickname: &str) -> anyhow::Result<User> {
        let mut tables = self.tables.write().await;
        if tables
            .users
            .values()
            .any(|u| u.id != id && u.nickname.as_deref() == Some(nickname))
        {
            anyhow::bail!("duplicate nickname: {nickname}");
        }
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| anyhow::anyhow!("user {id} not found"))?;
        user.nickname = Some(nickname.to_string());
        Ok(user.clone())
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn upsert(&self, user_id: i64, refresh_token: &str) -> anyhow::Result<RefreshToken> {
        let mut tables = self.tables.write().await;
        let tables = &mut *tables;
        let row = tables
            .refresh_tokens
            .entry(user_id)
            .and_modify(|row| row.refresh_token = refresh_token.to_string())
            .or_insert_with(|| RefreshToken {
                id: next(&mut tables.next_refresh_token_id),
                user_id,
                refresh_token: refresh_token.to_string(),
            });
        Ok(row.clone())
    }

    async fn find_by_user_id(&self, user_id: i64) -> anyhow::Result<Option<RefreshToken>> {
        Ok(self.tables.read().await.refresh_tokens.get(&user_id).cloned())
    }

    async fn find_by_refresh_token(
        &self,
        refresh_token: &str,
    ) -> anyhow::Result<Option<RefreshToken>> {
        let tables = self.tables.read().await;
        Ok(tables
            .refresh_tokens
            .values()
            .find(|row| row.refresh_token == refresh_token)
            .cloned())
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn create_article(&self, article: NewArticle) -> anyhow::Result<Article> {
        let mut tables = self.tables.write().await;
        let id = next(&mut tables.next_article_id);
        let now = OffsetDateTime::now_utc();
        let created = Article {
            id,
            title: article.title,
            content: article.content,
            author: article.author,
            created_at: now,
            updated_at: now,
        };
        tables.articles.insert(id, created.clone());
        Ok(created)
    }

    async fn list_articles(&self) -> anyhow::Result<Vec<Article>> {
        Ok(self.tables.read().await.articles.values().cloned().collect())
    }

    async fn find_article(&self, id: i64) -> anyhow::Result<Option<Article>> {
        Ok(self.tables.read().await.articles.get(&id).cloned())
    }

    async fn update_article(
        &self,
        id: i64,
        title: &str,
        content: &str,
    ) -> anyhow::Result<Option<Article>> {
        let mut tables = self.tables.write().await;
        Ok(tables.articles.get_mut(&id).map(|a| {
            a.title = title.to_string();
            a.content = content.to_string();
            a.updated_at = OffsetDateTime::now_utc();
            a.clone()
        }))
    }

    async fn delete_article(&self, id: i64) -> anyhow::Result<bool> {
        Ok(self.tables.write().await.articles.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: None,
            nickname: None,
        }
    }

    #[tokio::test]
    async fn user_ids_are_generated_and_emails_unique() {
        let store = MemoryStore::default();
        let a = store.create(new_user("a@x.io")).await.unwrap();
        let b = store.create(new_user("b@x.io")).await.unwrap();
        assert_eq!((a.id, b.id), (1, 2));
        assert!(store.create(new_user("a@x.io")).await.is_err());
    }

    #[tokio::test]
    async fn upsert_keeps_one_row_per_user() {
        let store = MemoryStore::default();
        let first = store.upsert(1, "t1").await.unwrap();
        let second = store.upsert(1, "t2").await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.refresh_token, "t2");

        assert!(store.find_by_refresh_token("t1").await.unwrap().is_none());
        assert_eq!(
            store.find_by_refresh_token("t2").await.unwrap().map(|r| r.user_id),
            Some(1)
        );

        let other = store.upsert(2, "t3").await.unwrap();
        assert_ne!(other.id, first.id);
    }
}
