use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::{
    articles::{
        dto::{AddArticleRequest, UpdateArticleRequest},
        repo::ArticleStore,
        repo_types::{Article, NewArticle},
    },
    auth::claims::Principal,
    error::ApiError,
};

#[derive(Clone)]
pub struct ArticleService {
    articles: Arc<dyn ArticleStore>,
}

fn not_found(id: i64) -> ApiError {
    ApiError::NotFound(format!("not found: {id}"))
}

fn require_text(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Only the author may modify an article.
fn authorize_author(article: &Article, principal: &Principal) -> Result<(), ApiError> {
    if article.author != principal.email {
        warn!(article_id = article.id, user = %principal.email, "not the author");
        return Err(ApiError::Forbidden("not authorized".into()));
    }
    Ok(())
}

impl ArticleService {
    pub fn new(articles: Arc<dyn ArticleStore>) -> Self {
        Self { articles }
    }

    #[instrument(skip(self, request))]
    pub async fn save(&self, request: AddArticleRequest, author: &str) -> Result<Article, ApiError> {
        require_text("title", &request.title)?;
        require_text("content", &request.content)?;
        let article = self
            .articles
            .create_article(NewArticle {
                title: request.title,
                content: request.content,
                author: author.to_string(),
            })
            .await?;
        info!(article_id = article.id, "article created");
        Ok(article)
    }

    pub async fn find_all(&self) -> Result<Vec<Article>, ApiError> {
        Ok(self.articles.list_articles().await?)
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Article, ApiError> {
        self.articles
            .find_article(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    #[instrument(skip(self, principal))]
    pub async fn delete(&self, id: i64, principal: &Principal) -> Result<(), ApiError> {
        let article = self.find_by_id(id).await?;
        authorize_author(&article, principal)?;
        if !self.articles.delete_article(id).await? {
            return Err(not_found(id));
        }
        info!(article_id = id, "article deleted");
        Ok(())
    }

    #[instrument(skip(self, request, principal))]
    pub async fn update(
        &self,
        id: i64,
        request: UpdateArticleRequest,
        principal: &Principal,
    ) -> Result<Article, ApiError> {
        require_text("title", &request.title)?;
        require_text("content", &request.content)?;
        let article = self.find_by_id(id).await?;
        authorize_author(&article, principal)?;
        self.articles
            .update_article(id, &request.title, &request.content)
            .await?
            .ok_or_else(|| not_found(id))
    }
}
