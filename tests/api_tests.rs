//! Integration tests for the HTTP API.
//!
//! These tests spawn a real Axum server on a random port and use reqwest
//! to hit it with actual HTTP requests.

use std::sync::Arc;
use std::time::Duration;

use rankflow::lookup::HttpLookupFactory;
use rankflow::models::ServiceConfig;
use rankflow::server::{self, AppState};
use rankflow::storage::CsvDatasetStore;

use tempfile::TempDir;

async fn spawn_test_server(data_dir: &TempDir) -> (String, Arc<AppState>) {
    let config = ServiceConfig {
        item_delay_ms: 0,
        batch_delay_ms: 0,
        batch_size: 2,
        ..Default::default()
    };
    let lookups = Arc::new(HttpLookupFactory::from_config(&config));
    let state = Arc::new(AppState::new(
        config,
        data_dir.path().to_path_buf(),
        Arc::new(CsvDatasetStore::new()),
        lookups,
    ));

    let router = server::create_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind to random port");
    let addr = listener.local_addr().expect("get local addr");
    let base_url = format!("http://{}", addr);

    tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    // Give the server a moment to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    (base_url, state)
}

fn upload_form(csv: &str, fields: &[(&str, &str)]) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(csv.as_bytes().to_vec())
        .file_name("keywords.csv")
        .mime_str("text/csv")
        .expect("mime");
    let mut form = reqwest::multipart::Form::new().part("csv_file", part);
    for (name, value) in fields {
        form = form.text(name.to_string(), value.to_string());
    }
    form
}

async fn wait_for_terminal(client: &reqwest::Client, base_url: &str, token: &str) -> serde_json::Value {
    for _ in 0..200 {
        let json: serde_json::Value = client
            .get(format!("{}/status", base_url))
            .query(&[("session_token", token)])
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        if json["is_processing"] == false && json["state"] != "Idle" {
            return json;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("job did not finish in time");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_health_endpoint_returns_correct_structure() {
    let tmp = TempDir::new().unwrap();
    let (base_url, _state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/health", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert!(json["uptime_seconds"].is_number());
    assert_eq!(json["job_state"], "Idle");
    assert_eq!(json["version"], "0.1.0");
}

#[tokio::test]
async fn test_upload_poll_and_download_in_test_mode() {
    let tmp = TempDir::new().unwrap();
    let (base_url, _state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let csv = "Keyword,Volume\neinstein,100\nphysics,50\neinstein,100\ntheory,10\n";
    let resp = client
        .post(format!("{}/upload", base_url))
        .multipart(upload_form(
            csv,
            &[
                ("target_url", "example.com"),
                ("device", "mobile"),
                ("test_mode", "true"),
            ],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["session_token"].as_str().unwrap().to_string();
    let file_id = body["file_id"].as_str().unwrap().to_string();

    let status = wait_for_terminal(&client, &base_url, &token).await;
    assert_eq!(status["state"], "Completed");
    assert_eq!(status["processed"], 4);
    assert_eq!(status["total"], 4);
    assert_eq!(status["current_key"], "Completed");
    assert_eq!(status["parameters_match"], true);

    let results = status["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert_eq!(results[0]["keyword"], "einstein");
    assert_eq!(results[0]["ranking"], results[2]["ranking"]);

    let resp = client
        .get(format!("{}/download", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/csv");
    let text = resp.text().await.unwrap();
    let mut lines = text.lines();
    assert_eq!(
        lines.next(),
        Some("Keyword,Volume,Ranking,Rank Group,Rank Absolute,Device")
    );
    assert!(lines.all(|l| l.ends_with(",mobile")));

    let resp = client
        .get(format!("{}/download-api/{}", base_url, file_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), text);

    assert!(tmp.path().join("uploads").join(&file_id).exists());
}

#[tokio::test]
async fn test_stale_token_reports_mismatch() {
    let tmp = TempDir::new().unwrap();
    let (base_url, state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload", base_url))
        .multipart(upload_form(
            "Keyword\nrust\n",
            &[("target_url", "example.com"), ("test_mode", "1")],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    state.controller.join().await;

    let json: serde_json::Value = client
        .get(format!("{}/status?session_token=1-000000000000-9", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["parameters_match"], false);
    assert_eq!(json["state"], "Completed");
}

#[tokio::test]
async fn test_upload_without_key_column_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let (base_url, _state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/upload", base_url))
        .multipart(upload_form(
            "Term,Volume\nrust,1\n",
            &[("target_url", "example.com"), ("test_mode", "true")],
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "validation_error");
}

#[tokio::test]
async fn test_check_rankings_via_http() {
    let tmp = TempDir::new().unwrap();
    let (base_url, _state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/check-rankings", base_url))
        .json(&serde_json::json!({
            "target_url": "example.com",
            "keywords": ["einstein", "physics"],
            "test_mode": true
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let json: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_events_stream_is_sse() {
    let tmp = TempDir::new().unwrap();
    let (base_url, _state) = spawn_test_server(&tmp).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{}/events", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let content_type = resp.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));
}
