use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use knowledge_base_schemas::MAX_CATEGORY_DEPTH;
use knowledge_base_server::{router, AllowAll, AppState, Authenticator, BearerToken};
use knowledge_base_store::Database;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

const TOKEN: &str = "test-token";

fn app_with(auth: Arc<dyn Authenticator>) -> Router {
    let db = Database::open_in_memory().unwrap();
    router(AppState::new(db, Duration::from_secs(60), auth))
}

fn open_app() -> Router {
    app_with(Arc::new(AllowAll))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_token(app, method, uri, body, None).await
}

async fn send_with_token(
    app: &Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn create_category(app: &Router, name: &str, parent: Option<i64>) -> i64 {
    let (status, body) = send(
        app,
        Method::POST,
        "/categories",
        Some(json!({ "name": name, "parent_id": parent })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "create {}: {}", name, body);
    assert_eq!(body["success"], true);
    body["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_is_public_and_api_requires_token() {
    let app = app_with(Arc::new(BearerToken::new(TOKEN)));

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    for uri in ["/categories", "/articles", "/tags", "/export"] {
        let (status, body) = send(&app, Method::GET, uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", uri);
        assert_eq!(body, json!({ "error": "Unauthorized" }));
    }

    let (status, _) = send_with_token(&app, Method::GET, "/categories", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send_with_token(&app, Method::GET, "/categories", None, Some(TOKEN)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_category_tree_and_cycle_rejection() {
    let app = open_app();
    let root = create_category(&app, "Root", None).await;
    let child = create_category(&app, "Child", Some(root)).await;
    let grandchild = create_category(&app, "Grandchild", Some(child)).await;

    let (status, forest) = send(&app, Method::GET, "/categories", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(forest.as_array().unwrap().len(), 1);
    assert_eq!(forest[0]["name"], "Root");
    assert_eq!(forest[0]["children"][0]["name"], "Child");
    assert_eq!(forest[0]["children"][0]["children"][0]["name"], "Grandchild");
    assert_eq!(forest[0]["children"][0]["children"][0]["children"], json!([]));

    let (status, body) = send(
        &app,
        Method::PUT,
        &format!("/categories?id={}", root),
        Some(json!({ "name": "Root", "parent_id": grandchild })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("cycle"));

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/categories?id={}", child),
        Some(json!({ "name": "Child", "parent_id": child })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Tree unchanged after the rejected moves
    let (_, after) = send(&app, Method::GET, "/categories", None).await;
    assert_eq!(after, forest);
}

#[tokio::test]
async fn test_category_error_statuses() {
    let app = open_app();
    let root = create_category(&app, "Root", None).await;
    create_category(&app, "Child", Some(root)).await;

    let (status, _) = send(&app, Method::POST, "/categories", Some(json!({ "name": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/categories",
        Some(json!({ "name": "Lost", "parent_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/categories?id=999",
        Some(json!({ "name": "Ghost", "parent_id": null })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::DELETE, &format!("/categories?id={}", root), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    for uri in ["/categories", "/categories?id=", "/categories?id=abc"] {
        let (status, body) = send(&app, Method::DELETE, uri, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(body["error"].is_string());
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/categories")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_forest_reflects_mutations_despite_cache() {
    let app = open_app();
    let docs = create_category(&app, "Docs", None).await;

    let (_, first) = send(&app, Method::GET, "/categories", None).await;
    assert_eq!(first[0]["article_count"], 0);

    let (status, body) = send(
        &app,
        Method::POST,
        "/articles",
        Some(json!({
            "title": "Install",
            "content": "Run the installer",
            "category_id": docs,
            "tags": ["setup"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);

    let (_, second) = send(&app, Method::GET, "/categories", None).await;
    assert_eq!(second[0]["article_count"], 1);

    create_category(&app, "API", None).await;
    let (_, third) = send(&app, Method::GET, "/categories", None).await;
    let names: Vec<&str> = third
        .as_array()
        .unwrap()
        .iter()
        .map(|n| n["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["API", "Docs"]);
}

#[tokio::test]
async fn test_articles_tags_and_cascading_delete() {
    let app = open_app();
    let docs = create_category(&app, "Docs", None).await;
    let guides = create_category(&app, "Guides", Some(docs)).await;

    let (_, created) = send(
        &app,
        Method::POST,
        "/articles",
        Some(json!({
            "title": "Upgrade",
            "content": "Steps",
            "category_id": guides,
            "tags": ["release", "setup"]
        })),
    )
    .await;
    let article_id = created["id"].as_i64().unwrap();

    let (status, detail) = send(&app, Method::GET, &format!("/articles?id={}", article_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Upgrade");
    assert_eq!(detail["category_name"], "Guides");
    assert_eq!(detail["tags"], json!(["release", "setup"]));

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/articles?id={}", article_id),
        Some(json!({
            "title": "Upgrade",
            "content": "New steps",
            "category_id": guides,
            "tags": ["setup"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, by_tag) = send(&app, Method::GET, "/articles?tag=setup", None).await;
    assert_eq!(by_tag.as_array().unwrap().len(), 1);
    let (_, by_old_tag) = send(&app, Method::GET, "/articles?tag=release", None).await;
    assert_eq!(by_old_tag, json!([]));
    let (_, by_category) = send(&app, Method::GET, &format!("/articles?category={}", docs), None).await;
    assert_eq!(by_category, json!([]));

    let (status, _) = send(&app, Method::GET, "/articles?id=404", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&app, Method::GET, "/articles?category=docs", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        Method::POST,
        "/articles",
        Some(json!({ "title": "Orphan", "content": "x", "category_id": 999 })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, outcome) = send(&app, Method::DELETE, &format!("/categories?id={}", guides), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome["deleted_articles"], 1);
    assert_eq!(outcome["deleted_tag_links"], 1);

    let (_, articles) = send(&app, Method::GET, "/articles", None).await;
    assert_eq!(articles, json!([]));

    let (_, tags) = send(&app, Method::GET, "/tags", None).await;
    let setup = tags
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["name"] == "setup")
        .unwrap();
    assert_eq!(setup["count"], 0);
}

#[tokio::test]
async fn test_export_import_between_instances() {
    let source = open_app();
    let root = create_category(&source, "Root", None).await;
    let child = create_category(&source, "Child", Some(root)).await;
    send(
        &source,
        Method::POST,
        "/articles",
        Some(json!({ "title": "Hello", "content": "World", "category_id": child, "tags": ["intro"] })),
    )
    .await;

    let (status, bundle) = send(&source, Method::GET, "/export", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(bundle["exported_at"].is_string());

    let target = open_app();
    let (status, stats) = send(&target, Method::POST, "/import", Some(bundle)).await;
    assert_eq!(status, StatusCode::OK, "{}", stats);
    assert_eq!(
        stats,
        json!({ "success": true, "categories": 2, "articles": 1, "tags": 1, "article_tags": 1 })
    );

    let (_, source_forest) = send(&source, Method::GET, "/categories", None).await;
    let (_, target_forest) = send(&target, Method::GET, "/categories", None).await;
    assert_eq!(source_forest, target_forest);

    let cyclic = json!({
        "categories": [
            { "id": 10, "name": "A", "parent_id": 11 },
            { "id": 11, "name": "B", "parent_id": 10 }
        ]
    });
    let (status, _) = send(&target, Method::POST, "/import", Some(cyclic)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, unchanged) = send(&target, Method::GET, "/categories", None).await;
    assert_eq!(unchanged, target_forest);
}

#[tokio::test]
async fn test_depth_limit_keeps_forest_servable() {
    let app = open_app();
    let mut parent = None;
    for level in 0..MAX_CATEGORY_DEPTH {
        parent = Some(create_category(&app, &format!("level-{}", level + 1), parent).await);
    }

    let (status, body) = send(
        &app,
        Method::POST,
        "/categories",
        Some(json!({ "name": "one-too-many", "parent_id": parent })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    // Nested JSON this deep is past serde_json's parse limit, so check the raw body.
    let request = Request::builder()
        .method(Method::GET)
        .uri("/categories")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("\"level-256\""));
    assert!(!text.contains("one-too-many"));
}
