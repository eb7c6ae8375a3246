#![allow(missing_docs)]

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use edgestore::{server, EdgeStatus, EdgeStore, StoreOptions};
use serde_json::{json, Value};
use tempfile::{tempdir, TempDir};
use tower::ServiceExt;

fn app() -> (TempDir, EdgeStore, Router) {
    let dir = tempdir().expect("tempdir");
    let store = EdgeStore::open(StoreOptions::new(dir.path().join("http.db"))).expect("open");
    let router = server::build_router(store.clone());
    (dir, store, router)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn health_reports_ok_without_cache() {
    let (_dir, _store, router) = app();
    let response = router
        .oneshot(
            Request::builder()
                .uri("/_ah/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let cache = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(cache.contains("no-cache"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let body: Value = serde_json::from_slice(&bytes).expect("json");
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn init_creates_type_and_accepts_legacy_envelope() {
    let (_dir, store, router) = app();
    let (status, body) = send(&router, post_json("/v1/edges/init", json!({"name": "follow"}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"success": true, "message": "follow - edge has been created successfully"})
    );
    assert!(store.type_exists("follow").expect("exists"));

    let (status, _) = send(
        &router,
        post_json("/v1/edges/init", json!({"edge": {"name": "like_post"}})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(store.type_exists("like_post").expect("exists"));
}

#[tokio::test]
async fn init_without_name_is_bad_request() {
    let (_dir, _store, router) = app();
    let (status, body) = send(&router, post_json("/v1/edges/init", json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["fields"], json!(["name"]));

    let (status, body) =
        send(&router, post_json("/v1/edges/init", json!({"name": "x; DROP TABLE y"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["name"]));
}

#[tokio::test]
async fn save_then_query_round_trip() {
    let (_dir, _store, router) = app();
    send(&router, post_json("/v1/edges/init", json!({"name": "follow"}))).await;

    let (status, body) = send(
        &router,
        post_json(
            "/v1/edges/save",
            json!({"edges": [{
                "name": "follow",
                "src_id": 1,
                "dest_id": 2,
                "src_type": "user",
                "score": 0.5,
                "data": {"via": "search"},
                "updated": "2024-01-01T00:00:00Z"
            }]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, body) = send(
        &router,
        post_json("/v1/query", json!({"query": "SELECT * FROM follow"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let edge = &body["edges"][0];
    assert_eq!(edge["id"], "1:2");
    assert_eq!(edge["src_type"], "user");
    assert_eq!(edge["score"], 0.5);
    assert_eq!(edge["data"], json!({"via": "search"}));
    assert_eq!(edge["status"], "active");
    assert_eq!(edge["updated"], "2024-01-01T00:00:00Z");
}

#[tokio::test]
async fn save_defaults_status_and_updated() {
    let (_dir, store, router) = app();
    store.ensure_type("follow").expect("ensure");
    let (status, _) = send(
        &router,
        post_json("/v1/edges/save", json!({"edges": [{"name": "follow", "src_id": 3, "dest_id": 4}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let rows = store.run_query("SELECT * FROM follow").expect("query");
    assert_eq!(rows[0].status, Some(EdgeStatus::Active));
    assert!(rows[0].updated.is_some());
}

#[tokio::test]
async fn save_validation_reports_field_paths() {
    let (_dir, _store, router) = app();
    let cases = [
        (json!({"edges": []}), json!(["edges"])),
        (json!({}), json!(["edges"])),
        (
            json!({"edges": [{"name": "follow", "src_id": 1, "dest_id": 2}, {"src_id": 1, "dest_id": 2}]}),
            json!(["edges.1.name"]),
        ),
        (
            json!({"edges": [{"name": "follow"}]}),
            json!(["edges.0.src_id", "edges.0.dest_id"]),
        ),
    ];
    for (payload, fields) in cases {
        let (status, body) = send(&router, post_json("/v1/edges/save", payload.clone())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{payload}");
        assert_eq!(body["fields"], fields, "{payload}");
    }
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let (_dir, _store, router) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/edges/save")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"edges\": [oops"))
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
    assert_eq!(body["fields"], Value::Null);
}

#[tokio::test]
async fn non_json_content_type_is_rejected() {
    let (_dir, _store, router) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v1/edges/save")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("{}"))
        .expect("request");
    let (status, body) = send(&router, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["code"], 415);
}

#[tokio::test]
async fn save_into_uninitialized_type_is_server_error() {
    let (_dir, _store, router) = app();
    let (status, body) = send(
        &router,
        post_json(
            "/v1/edges/save",
            json!({"edges": [{"name": "ghost", "src_id": 1, "dest_id": 2}]}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["code"], 500);
}

#[tokio::test]
async fn delete_marks_rows_deleted() {
    let (_dir, store, router) = app();
    store.ensure_type("follow").expect("ensure");
    send(
        &router,
        post_json(
            "/v1/edges/save",
            json!({"edges": [{"name": "follow", "src_id": 1, "dest_id": 2, "updated": "2999-01-01T00:00:00Z"}]}),
        ),
    )
    .await;
    let (status, body) = send(
        &router,
        post_json("/v1/edges/delete", json!({"edges": [{"name": "follow", "src_id": 1, "dest_id": 2}]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));
    let rows = store.run_query("SELECT * FROM follow").expect("query");
    assert_eq!(rows[0].status, Some(EdgeStatus::Deleted));
}

#[tokio::test]
async fn empty_query_is_bad_request() {
    let (_dir, _store, router) = app();
    let (status, body) = send(&router, post_json("/v1/query", json!({"query": ""}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["query"]));
}

#[tokio::test]
async fn trailing_slash_is_tolerated() {
    let dir = tempdir().expect("tempdir");
    let store = EdgeStore::open(StoreOptions::new(dir.path().join("slash.db"))).expect("open");
    let app = server::build_app(store.clone());
    let response = app
        .oneshot(post_json("/v1/edges/init/", json!({"name": "follow"})))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    assert!(store.type_exists("follow").expect("exists"));
}
