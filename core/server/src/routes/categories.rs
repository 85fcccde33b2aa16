use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use knowledge_base_schemas::{CategoryId, CategoryUpdate, NewCategory};
use serde_json::json;
use tracing::{debug, info};

use super::{AppState, IdQuery};
use crate::error::ApiResult;

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    if let Some(forest) = state.forest_cache.get().await {
        debug!("Serving category forest from cache ({} roots)", forest.len());
        return Ok(([(header::CACHE_CONTROL, "no-cache")], Json(forest)));
    }

    // Stored while the lock is held; mutations invalidate under the same lock
    let db = state.db.lock().await;
    let forest = db.category_forest()?;
    state.forest_cache.put(forest.clone()).await;

    Ok(([(header::CACHE_CONTROL, "no-cache")], Json(forest)))
}

pub async fn create_category(
    State(state): State<AppState>,
    payload: Result<Json<NewCategory>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;

    let mut db = state.db.lock().await;
    let id = db.create_category(&request)?;
    state.forest_cache.invalidate().await;

    info!("Created category {} ({})", id, request.name.trim());
    Ok(Json(json!({ "success": true, "id": id })))
}

pub async fn update_category(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
    payload: Result<Json<CategoryUpdate>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let id = CategoryId(query.require()?);
    let Json(update) = payload?;

    let mut db = state.db.lock().await;
    let changes = db.update_category(id, &update)?;
    state.forest_cache.invalidate().await;

    info!("Updated category {} (parent={:?})", id, update.parent_id);
    Ok(Json(json!({ "success": true, "changes": changes })))
}

pub async fn delete_category(
    State(state): State<AppState>,
    Query(query): Query<IdQuery>,
) -> ApiResult<impl IntoResponse> {
    let id = CategoryId(query.require()?);

    let mut db = state.db.lock().await;
    let outcome = db.delete_category(id)?;
    state.forest_cache.invalidate().await;

    info!(
        "Deleted category {} with {} articles",
        id, outcome.deleted_articles
    );
    Ok(Json(json!({
        "success": true,
        "deleted_articles": outcome.deleted_articles,
        "deleted_tag_links": outcome.deleted_tag_links
    })))
}
