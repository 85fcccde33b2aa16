use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use knowledge_base_schemas::{ArticleFilter, ArticleId, CategoryId, NewArticle};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{parse_id, AppState, IdQuery};
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ArticlesQuery {
    id: Option<String>,
    category: Option<String>,
    tag: Option<String>,
}

/// `GET /articles?id=` returns one article, otherwise a filtered list
pub async fn get_articles(
    State(state): State<AppState>,
    Query(query): Query<ArticlesQuery>,
) -> ApiResult<Response> {
    let db = state.db.lock().await;

    if query.id.is_some() {
        let id = ArticleId(parse_id(query.id.as_deref(), "id")?);
        let article = db
            .get_article(id)?
            .ok_or_else(|| ApiError::NotFound(format!("article {} not found", id.0)))?;
        return Ok(Json(article).into_response());
    }

    let filter = ArticleFilter {
        category_id: match query.category.as_deref() {
            Some(raw) => Some(CategoryId(parse_id(Some(raw), "category")?)),
            None => None,
        },
        tag: query
            .tag
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty()),
    };

    let articles = db.list_articles(&filter)?;
    Ok(Json(articles).into_response())
}

pub async fn create_article(
    State(state): State<AppState>,
    payload: Result<Json<NewArticle>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;

    let mut db = state.db.lock().await;
    let id = db.create_article(&request)?;
    // Article counts are part of the forest
    state.forest_cache.invalidate().await;

    info!("Created article {} in category {}", id.0, request.category_id);
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn update_article(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    payload: Result<Json<NewArticle>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = ArticleId(query.require()?);
    let Json(request) = payload?;

    let mut db = state.db.lock().await;
    db.update_article(id, &request)?;
    state.forest_cache.invalidate().await;

    info!("Updated article {}", id.0);
    Ok(Json(json!({ "success": true })))
}

pub async fn list_tags(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.lock().await;
    Ok(Json(db.list_tags()?))
}
