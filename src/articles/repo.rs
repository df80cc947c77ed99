use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;

use crate::articles::repo_types::{Article, NewArticle};

#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn create_article(&self, article: NewArticle) -> anyhow::Result<Article>;
    async fn list_articles(&self) -> anyhow::Result<Vec<Article>>;
    async fn find_article(&self, id: i64) -> anyhow::Result<Option<Article>>;
    async fn update_article(&self, id: i64, title: &str, content: &str)
        -> anyhow::Result<Option<Article>>;
    /// Returns whether a row was removed.
    async fn delete_article(&self, id: i64) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgArticleStore {
    db: PgPool,
}

impl PgArticleStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn create_article(&self, article: NewArticle) -> anyhow::Result<Article> {
        let row = sqlx::query_as::<_, Article>(
            r#"
            INSERT INTO articles (title, content, author)
            VALUES ($1, $2, $3)
            RETURNING id, title, content, author, created_at, updated_at
            "#,
        )
        .bind(article.title)
        .bind(article.content)
        .bind(article.author)
        .fetch_one(&self.db)
        .await
        .context("insert article")?;
        Ok(row)
    }

    async fn list_articles(&self) -> anyhow::Result<Vec<Article>> {
        let rows = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, title, content, author, created_at, updated_at
            FROM articles
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await
        .context("list articles")?;
        Ok(rows)
    }

    async fn find_article(&self, id: i64) -> anyhow::Result<Option<Article>> {
        let row = sqlx::query_as::<_, Article>(
            r#"
            SELECT id, title, content, author, created_at, updated_at
            FROM articles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find article")?;
        Ok(row)
    }

    async fn update_article(
        &self,
        id: i64,
        title: &str,
        content: &str,
    ) -> anyhow::Result<Option<Article>> {
        let row = sqlx::query_as::<_, Article>(
            r#"
            UPDATE articles
               SET title = $2, content = $3, updated_at = now()
             WHERE id = $1
            RETURNING id, title, content, author, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(title)
        .bind(content)
        .fetch_optional(&self.db)
        .await
        .context("update article")?;
        Ok(row)
    }

    async fn delete_article(&self, id: i64) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM articles WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete article")?;
        Ok(res.rows_affected() > 0)
    }
}
