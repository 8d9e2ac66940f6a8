use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tp_core::{Article, ArticleFilter, ArticleStorage, ArticleUpdate};
use tracing::info;
use url::Url;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateArticle {
    pub url: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub filter: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArticleList {
    pub articles: Vec<Article>,
    pub count: usize,
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

pub async fn list_articles(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ArticleList>> {
    let filter: ArticleFilter = params.filter.as_deref().unwrap_or_default().parse().unwrap_or_default();
    let articles = state.storage.list_articles(user.id, filter).await?;
    Ok(Json(ArticleList {
        count: articles.len(),
        articles,
    }))
}

/// Only absolute http(s) URLs are accepted for saving. Blocked hosts still
/// get stored, with the extractor's degraded result.
fn submitted_url(raw: &str) -> ApiResult<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| ApiError::Unprocessable(format!("Invalid URL: {}", e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ApiError::Unprocessable(format!("Invalid URL scheme: {}", other))),
    }
}

pub async fn create_article(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Json(request): Json<CreateArticle>,
) -> ApiResult<(StatusCode, Json<Article>)> {
    let url = submitted_url(&request.url)?;
    let extracted = state.extractor.extract(url.as_str()).await;
    let article = state.storage.create_article(user.id, url.as_str(), &extracted).await?;
    info!(article_id = article.id, user_id = user.id, url = %article.url, "Saved article");
    Ok((StatusCode::CREATED, Json(article)))
}

pub async fn get_article(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<Json<Article>> {
    state
        .storage
        .get_article(id, user.id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn update_article(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<ArticleUpdate>,
) -> ApiResult<Json<Article>> {
    let article = state
        .storage
        .get_article(id, user.id)
        .await?
        .ok_or(ApiError::NotFound)?;

    if update.needs_favorite_toggle(&article) {
        state.storage.toggle_favorite(id, user.id).await?;
    }
    if update.needs_archive_toggle(&article) {
        state.storage.toggle_archive(id, user.id).await?;
    }

    state
        .storage
        .get_article(id, user.id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

pub async fn delete_article(
    State(state): State<Arc<AppState>>,
    AuthUser(user): AuthUser,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if state.storage.delete_article(id, user.id).await? {
        info!(article_id = id, user_id = user.id, "Deleted article");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submitted_url() {
        assert!(submitted_url("https://example.com/a").is_ok());
        assert!(submitted_url(" http://192.168.1.1/admin ").is_ok());
        assert!(matches!(submitted_url("ftp://example.com"), Err(ApiError::Unprocessable(_))));
        assert!(matches!(submitted_url("example.com/a"), Err(ApiError::Unprocessable(_))));
    }
}
