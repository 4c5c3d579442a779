//! Integration tests for the `/api/*` HTTP endpoints.

mod common;

use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{test_context, test_settings, write_project};
use zunda_axum::{CorsConfig, create_router, create_spa_router};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn app(import_dir: &std::path::Path) -> Router {
    create_router(test_context(test_settings(import_dir)), &CorsConfig::AllowAll)
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    into_json(response).await
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    into_json(response).await
}

async fn into_json(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&body)
        .unwrap_or_else(|e| panic!("Expected JSON body ({e}): {}", String::from_utf8_lossy(&body)));
    (status, json)
}

async fn wait_for_state(app: &Router, state: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let (_, status) = get(app, "/api/timeline/status").await;
            if status["state"] == state {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timeline never reached '{state}'"));
}

// ── Health and projects ───────────────────────────────────────────────────────

#[tokio::test]
async fn health_reports_an_idle_stage() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, body) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["voicevox"], Value::Null);
    assert_eq!(body["obs_enabled"], false);
    assert_eq!(body["clients"], json!({"presentation": 0, "control": 0}));
    assert_eq!(body["timeline"], "idle");
    assert_eq!(body["speech"], "idle");
}

#[tokio::test]
async fn projects_are_listed_and_loadable_by_name() {
    let import = tempfile::tempdir().unwrap();
    write_project(
        import.path(),
        "episode1",
        r#"{"title": "Episode 1", "timeline": [{"time": 0, "text": "hello"}]}"#,
    );
    let app = app(import.path());

    let (status, projects) = get(&app, "/api/projects").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(projects[0]["name"], "episode1");
    assert_eq!(projects[0]["has_scene_timeline"], false);

    let (status, loaded) = post(&app, "/api/timeline/load", json!({"project": "episode1"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded, json!({"total": 1, "project": "episode1", "title": "Episode 1"}));

    let (status, latest) = post(&app, "/api/timeline/load", json!({"latest": true})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(latest["project"], "episode1");

    let (status, body) = post(&app, "/api/timeline/load", json!({"project": "missing"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn spa_router_serves_the_presentation_page() {
    let import = tempfile::tempdir().unwrap();
    let site = tempfile::tempdir().unwrap();
    std::fs::write(site.path().join("index.html"), "<html>stage</html>").unwrap();

    let app = create_spa_router(
        test_context(test_settings(import.path())),
        site.path(),
        &CorsConfig::AllowAll,
    );

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"<html>stage</html>");

    let (status, _) = get(&app, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
}

// ── Timeline ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn inline_timeline_loads_and_reports_status() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, loaded) = post(
        &app,
        "/api/timeline/load",
        json!({"timeline": {"title": "Live", "timeline": [
            {"time": 1.0, "text": "second"},
            {"time": 0.0, "text": "first"},
        ]}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["total"], 2);

    let (_, status_body) = get(&app, "/api/timeline/status").await;
    assert_eq!(status_body["state"], "loaded");
    assert_eq!(status_body["total"], 2);
    assert_eq!(status_body["title"], "Live");
}

#[tokio::test]
async fn invalid_load_requests_are_bad_requests() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, body) = post(&app, "/api/timeline/load", json!({"timeline": []})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);
    assert!(body["error"].as_str().unwrap().contains("no actions"));

    let (status, _) = post(
        &app,
        "/api/timeline/load",
        json!({"timeline": [{"time": -1, "text": "x"}]}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(&app, "/api/timeline/load", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = post(
        &app,
        "/api/timeline/load",
        json!({"project": "a", "latest": true}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn run_needs_a_loaded_timeline() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, body) = post(&app, "/api/timeline/run", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn running_timeline_can_be_paused_resumed_and_stopped() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    post(
        &app,
        "/api/timeline/load",
        json!({"timeline": [{"time": 0, "text": "now"}, {"time": 60, "text": "much later"}]}),
    )
    .await;

    let (status, _) = post(&app, "/api/timeline/run", json!({})).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    wait_for_state(&app, "running").await;

    let (status, _) = post(&app, "/api/timeline/run", json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, paused) = post(&app, "/api/timeline/pause", json!({})).await;
    assert_eq!(paused["changed"], true);
    assert_eq!(paused["status"]["state"], "paused");

    let (_, again) = post(&app, "/api/timeline/pause", json!({})).await;
    assert_eq!(again["changed"], false);

    let (_, resumed) = post(&app, "/api/timeline/resume", json!({})).await;
    assert_eq!(resumed["changed"], true);

    let (_, stopped) = post(&app, "/api/timeline/stop", json!({})).await;
    assert_eq!(stopped["changed"], true);
    wait_for_state(&app, "idle").await;
}

#[tokio::test]
async fn controls_without_a_run_change_nothing() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    for uri in ["/api/timeline/pause", "/api/timeline/resume", "/api/timeline/stop"] {
        let (status, body) = post(&app, uri, json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], false, "{uri}");
        assert_eq!(body["status"]["state"], "idle");
    }
}

// ── Speech and comments ───────────────────────────────────────────────────────

#[tokio::test]
async fn speak_waits_for_the_outcome() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, outcome) = post(&app, "/api/speak", json!({"text": "こんにちは", "character": "metan"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(outcome, json!({"outcome": "completed"}));

    let (status, _) = post(&app, "/api/speak", json!({"text": "   "})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn comment_returns_its_report() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (status, report) = post(
        &app,
        "/api/comments",
        json!({"username": "X", "text": "こんにちは"}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["username"], "X");
    assert_eq!(report["response"], "Xさん、こんにちはなのだ！");
    assert_eq!(
        report["outcomes"],
        json!([{"outcome": "completed"}, {"outcome": "completed"}])
    );
    assert_eq!(report["paused_timeline"], false);
}

#[tokio::test]
async fn speech_status_and_cancel_when_idle() {
    let import = tempfile::tempdir().unwrap();
    let app = app(import.path());

    let (_, status) = get(&app, "/api/speech/status").await;
    assert_eq!(status["state"], "idle");

    let (_, cancelled) = post(&app, "/api/speech/cancel", json!({})).await;
    assert_eq!(cancelled, json!({"cancelled": false}));
}
