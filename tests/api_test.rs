//! Router tests driven through `tower::ServiceExt::oneshot`.

mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use common::*;
use retrace::config::Config;
use retrace::services::TaskStore;
use retrace::AppState;
use serde_json::Value;
use tower::ServiceExt;

fn test_app(provider: ScriptedProvider) -> (Router, AppState) {
    let mut config = Config::default();
    config.scan = scan_config();

    let store = Arc::new(TaskStore::new_in_memory().unwrap());
    let state = AppState::new(config, Arc::new(provider), store);
    (retrace::app(state.clone()), state)
}

fn sample_provider() -> ScriptedProvider {
    ScriptedProvider::new()
        .with_instrument("600519.SH", "liquor", retracement_series(100.0, 80.0))
        .with_instrument("000001.SZ", "bank", flat_series(10.0))
        .with_instrument("000002.SZ", "", flat_series(8.0))
}

async fn call(app: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (app, _) = test_app(ScriptedProvider::new());

    let (status, body) = call(&app, Method::GET, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["provider"], "scripted");
    assert_eq!(body["jobStatus"], "idle");
}

#[tokio::test]
async fn test_idle_progress_and_control_conflict() {
    let (app, _) = test_app(ScriptedProvider::new());

    let (status, body) = call(&app, Method::GET, "/api/screen/progress").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
    assert_eq!(body["jobId"], Value::Null);

    for action in ["pause", "resume", "cancel"] {
        let (status, body) = call(&app, Method::POST, &format!("/api/screen/{}", action)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["status"], 409);
        assert_eq!(body["error"], "no active screening job");
    }
}

#[tokio::test]
async fn test_screen_then_browse_tasks() {
    let (app, state) = test_app(sample_provider());

    let (status, body) = call(&app, Method::POST, "/api/screen/start?screen_all=true&batch_size=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["started"], true);
    let job_id = body["jobId"].as_str().unwrap().to_string();

    let progress = wait_for_terminal(&state.controller).await;
    assert_eq!(progress.found, 1);

    let (_, body) = call(&app, Method::GET, "/api/screen/results").await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["data"][0]["instrumentCode"], "600519.SH");

    let (status, body) = call(&app, Method::GET, "/api/tasks?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);
    assert_eq!(body["tasks"][0]["jobId"], job_id.as_str());
    assert_eq!(body["limit"], 10);

    let (status, body) = call(&app, Method::GET, &format!("/api/tasks/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "completed");
    assert_eq!(body["totalBatches"], 2);
    assert_eq!(body["live"]["status"], "completed");

    let (_, body) = call(&app, Method::GET, &format!("/api/tasks/{}/results", job_id)).await;
    assert_eq!(body["count"], 1);

    let (_, body) = call(&app, Method::GET, "/api/tasks/stats").await;
    assert_eq!(body["totalTasks"], 1);
    assert_eq!(body["completedTasks"], 1);
    assert_eq!(body["totalFound"], 1);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/tasks/{}", job_id)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = call(&app, Method::GET, &format!("/api/tasks/{}", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], 404);
}

#[tokio::test]
async fn test_second_start_reports_running_job() {
    let mut provider = sample_provider();
    let gate = provider.gate("600519.SH");
    let (app, state) = test_app(provider);

    let (_, first) = call(&app, Method::POST, "/api/screen/start").await;
    gate.wait_reached().await;
    let (status, second) = call(&app, Method::POST, "/api/screen/start").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["started"], false);
    assert_eq!(first["jobId"], second["jobId"]);

    let (status, _) = call(&app, Method::DELETE, &format!("/api/tasks/{}", first["jobId"].as_str().unwrap())).await;
    assert_eq!(status, StatusCode::CONFLICT);

    gate.open();
    wait_for_terminal(&state.controller).await;
}

#[tokio::test]
async fn test_bad_requests() {
    let (app, _) = test_app(sample_provider());

    let (status, _) = call(&app, Method::GET, "/api/tasks?limit=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::GET, "/api/tasks?limit=101").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::POST, "/api/screen/start?batch_size=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&app, Method::GET, "/api/tasks/task_missing/results").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_out_of_range_lookback_is_bad_request() {
    let (app, _) = test_app(sample_provider());

    let (status, body) = call(&app, Method::GET, "/api/stock/600519.SH?lookback_days=4000000000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["status"], 400);

    let (status, _) = call(&app, Method::POST, "/api/screen/start?lookback_days=4000000000").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The server still serves requests and no job was wedged.
    let (status, body) = call(&app, Method::GET, "/api/screen/progress").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "idle");
}

#[tokio::test]
async fn test_stock_detail() {
    let (app, _) = test_app(sample_provider());

    let (status, body) = call(&app, Method::GET, "/api/stock/600519.SH?lookback_days=30").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["series"].as_array().unwrap().len(), 5);
    assert_eq!(body["runs"].as_array().unwrap().len(), 1);
    assert_eq!(body["runs"][0]["length"], 3);
    assert_eq!(body["signal"]["startPrice"], 100.0);

    let (_, body) = call(&app, Method::GET, "/api/stock/000001.SZ").await;
    assert_eq!(body["signal"], Value::Null);

    let (status, _) = call(&app, Method::GET, "/api/stock/UNKNOWN").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_sectors_and_token_check() {
    let (app, _) = test_app(sample_provider());

    let (status, body) = call(&app, Method::GET, "/api/sectors").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], serde_json::json!(["bank", "liquor"]));

    let (status, body) = call(&app, Method::GET, "/api/verify-token").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
}
