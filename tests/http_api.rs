//! Integration tests for the HTTP endpoint.
//!
//! Each test binds a server to an ephemeral local port.

mod common;

use std::sync::Arc;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use common::{shared, OfflineProvider, Script, ScriptedCompute};
use sim_dispatch::api::{self, AppState};
use sim_dispatch::dispatch::{DispatchConfig, DispatchController};
use sim_dispatch::metrics::DispatchMetrics;

async fn spawn_server(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(api::serve(listener, state, std::future::pending::<()>()));
    format!("http://{}", addr)
}

async fn default_server() -> (String, Arc<DispatchMetrics>) {
    let metrics = Arc::new(DispatchMetrics::new().unwrap());
    let compute = shared(ScriptedCompute::new().script("c", Script::AlwaysFail));
    let controller = DispatchController::builder(compute)
        .config(DispatchConfig::default().with_max_retries(0))
        .observer(metrics.clone())
        .build()
        .unwrap();
    let state = AppState::new(Arc::new(controller)).with_metrics(metrics.clone());
    (spawn_server(state).await, metrics)
}

async fn offline_server() -> String {
    let controller = DispatchController::builder(shared(ScriptedCompute::new()))
        .resources(Arc::new(OfflineProvider))
        .build()
        .unwrap();
    spawn_server(AppState::new(Arc::new(controller))).await
}

#[tokio::test]
async fn test_batch_request() {
    let (base, _) = default_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/simulate", base))
        .json(&json!({
            "simulations": [
                {"id": "a", "character": {"name": "A"}},
                {
                    "id": "b",
                    "character": {"name": "B"},
                    "equipmentOverride": {"head": {"ilvl": 610}}
                },
                {"id": "c", "character": {"name": "C"}}
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["summary"]["total"], 3);
    assert_eq!(body["summary"]["successful"], 2);
    assert_eq!(body["summary"]["failed"], 1);
    assert!(body["summary"]["duration"].is_u64());
    assert_eq!(body["results"]["a"]["success"], true);
    assert_eq!(body["results"]["c"]["success"], false);
    assert_eq!(body["results"]["c"]["error"], "attempt 1 failed");
    // Successful outcomes omit the error field.
    assert!(body["results"]["a"].get("error").is_none());
}

#[tokio::test]
async fn test_single_request_returns_bare_outcome() {
    let (base, _) = default_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/simulate", base))
        .json(&json!({"character": {"name": "Solo"}, "rawCharacterData": "warrior=\"Solo\""}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["metrics"]["task"], "single");
    assert!(body.get("summary").is_none());
}

#[tokio::test]
async fn test_empty_batch() {
    let (base, _) = default_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/simulate", base))
        .json(&json!({"simulations": []}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["results"], json!({}));
    assert_eq!(body["summary"]["total"], 0);
}

#[tokio::test]
async fn test_malformed_requests_get_fatal_response() {
    let (base, _) = default_server().await;
    let client = reqwest::Client::new();

    for body in ["{\"foo\": 1}", "[1, 2, 3]", "not json"] {
        let response = client
            .post(format!("{}/api/simulate", base))
            .body(body)
            .send()
            .await
            .unwrap();

        assert_eq!(
            response.status(),
            StatusCode::INTERNAL_SERVER_ERROR,
            "body: {}",
            body
        );
        let fatal: Value = response.json().await.unwrap();
        assert_eq!(fatal["results"], json!({}), "body: {}", body);
        assert_eq!(fatal["summary"]["total"], 0);
        assert_eq!(fatal["summary"]["successful"], 0);
        assert_eq!(fatal["summary"]["failed"], 0);
        assert!(fatal["error"].is_string());
    }
}

#[tokio::test]
async fn test_fatal_batch_returns_500() {
    let base = offline_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/simulate", base))
        .json(&json!({
            "simulations": [
                {"id": "a", "character": {}},
                {"id": "b", "character": {}}
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["summary"]["total"], 2);
    assert_eq!(body["summary"]["successful"], 0);
    assert_eq!(body["summary"]["failed"], 2);
    assert_eq!(body["results"]["a"]["success"], false);
}

#[tokio::test]
async fn test_fatal_single_returns_failed_outcome() {
    let base = offline_server().await;

    let response = reqwest::Client::new()
        .post(format!("{}/api/simulate", base))
        .json(&json!({"character": {}}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .contains("simulation cluster offline"));
}

#[tokio::test]
async fn test_health() {
    let (base, _) = default_server().await;

    let body: Value = reqwest::get(format!("{}/health", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_metrics_reflect_dispatched_tasks() {
    let (base, metrics) = default_server().await;
    let client = reqwest::Client::new();

    client
        .post(format!("{}/api/simulate", base))
        .json(&json!({
            "simulations": [
                {"id": "a", "character": {}},
                {"id": "c", "character": {}}
            ]
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(metrics.tasks_dispatched(), 2);
    assert_eq!(metrics.tasks_succeeded(), 1);
    assert_eq!(metrics.tasks_failed(), 1);

    let response = client.get(format!("{}/metrics", base)).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.text().await.unwrap();
    assert!(text.contains("sim_dispatch_tasks_dispatched_total 2"));
    assert!(text.contains("sim_dispatch_batches_total{status=\"complete\"} 1"));
}

#[tokio::test]
async fn test_metrics_disabled() {
    let base = offline_server().await;

    let response = reqwest::get(format!("{}/metrics", base)).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
