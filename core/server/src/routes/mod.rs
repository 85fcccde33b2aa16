use axum::{
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use knowledge_base_store::Database;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{require_auth, Authenticator};
use crate::cache::ForestCache;
use crate::error::{ApiError, ApiResult};

mod articles;
mod categories;
mod transfer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub forest_cache: Arc<ForestCache>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    pub fn new(db: Database, cache_ttl: Duration, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            forest_cache: Arc::new(ForestCache::new(cache_ttl)),
            auth,
        }
    }
}

/// Build the full HTTP surface. Everything except `/health` requires authentication.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route(
            "/categories",
            get(categories::list_categories)
                .post(categories::create_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route(
            "/articles",
            get(articles::get_articles)
                .post(articles::create_article)
                .put(articles::update_article),
        )
        .route("/tags", get(articles::list_tags))
        .route("/export", get(transfer::export_data))
        .route("/import", post(transfer::import_data))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "knowledge-base",
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// `?id=` as used by the update and delete routes
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    id: Option<String>,
}

impl IdQuery {
    pub fn require(&self) -> ApiResult<i64> {
        parse_id(self.id.as_deref(), "id")
    }
}

pub(crate) fn parse_id(raw: Option<&str>, field: &str) -> ApiResult<i64> {
    let raw = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| ApiError::bad_request(format!("missing {} parameter", field)))?;

    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request(format!("invalid {} parameter: {}", field, raw)))
}
