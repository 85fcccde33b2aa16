use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    Json,
};
use knowledge_base_schemas::ExportBundle;
use serde_json::json;
use tracing::info;

use super::AppState;
use crate::error::ApiResult;

pub async fn export_data(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let db = state.db.lock().await;
    let bundle = db.export()?;

    Ok((
        [(
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"knowledge-base-export.json\"",
        )],
        Json(bundle),
    ))
}

pub async fn import_data(
    State(state): State<AppState>,
    payload: Result<Json<ExportBundle>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(bundle) = payload?;
    info!(
        "Import request: {} categories, {} articles",
        bundle.categories.len(),
        bundle.articles.len()
    );

    let mut db = state.db.lock().await;
    let stats = db.import(&bundle)?;
    state.forest_cache.invalidate().await;

    Ok(Json(json!({
        "success": true,
        "categories": stats.categories,
        "articles": stats.articles,
        "tags": stats.tags,
        "article_tags": stats.article_tags
    })))
}
