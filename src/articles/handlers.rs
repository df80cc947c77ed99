use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;

use crate::{
    articles::dto::{AddArticleRequest, ArticleResponse, UpdateArticleRequest},
    auth::extractors::AuthUser,
    error::ApiError,
    state::AppState,
};

pub fn article_routes() -> Router<AppState> {
    Router::new()
        .route("/api/articles", get(find_all_articles).post(add_article))
        .route(
            "/api/articles/:id",
            get(find_article).put(update_article).delete(delete_article),
        )
}

#[instrument(skip(state, principal, request))]
pub async fn add_article(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Json(request): Json<AddArticleRequest>,
) -> Result<(StatusCode, Json<ArticleResponse>), ApiError> {
    let article = state.articles.save(request, &principal.email).await?;
    Ok((StatusCode::CREATED, Json(article.into())))
}

#[instrument(skip(state, _principal))]
pub async fn find_all_articles(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
) -> Result<Json<Vec<ArticleResponse>>, ApiError> {
    let articles = state.articles.find_all().await?;
    Ok(Json(articles.into_iter().map(ArticleResponse::from).collect()))
}

#[instrument(skip(state, _principal))]
pub async fn find_article(
    State(state): State<AppState>,
    AuthUser(_principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ArticleResponse>, ApiError> {
    Ok(Json(state.articles.find_by_id(id).await?.into()))
}

#[instrument(skip(state, principal))]
pub async fn delete_article(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    state.articles.delete(id, &principal).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip(state, principal, request))]
pub async fn update_article(
    State(state): State<AppState>,
    AuthUser(principal): AuthUser,
    Path(id): Path<i64>,
    Json(request): Json<UpdateArticleRequest>,
) -> Result<Json<ArticleResponse>, ApiError> {
    let article = state.articles.update(id, request, &principal).await?;
    Ok(Json(article.into()))
}
