// CLI service commands: status, cancel

use reqwest::Client;
use serde_json::Value;

use super::{base_url, connection_error_message};
use crate::models::PollerParams;

/// Helper to handle reqwest errors and produce a user-friendly connection error.
fn handle_request_error(err: reqwest::Error, host: &str, port: u16) -> anyhow::Error {
    if err.is_connect() || err.is_timeout() {
        anyhow::anyhow!("{}", connection_error_message(host, port))
    } else {
        anyhow::anyhow!("Request failed: {}", err)
    }
}

fn error_message(body: &Value, fallback: &str) -> String {
    body["message"].as_str().unwrap_or(fallback).to_string()
}

/// Render a status body as the lines printed by `rankflow status`.
pub fn format_status(body: &Value) -> Vec<String> {
    let state = body["state"].as_str().unwrap_or("unknown");
    let processed = body["processed"].as_u64().unwrap_or(0);
    let total = body["total"].as_u64().unwrap_or(0);

    let mut lines = vec![format!("Job State:   {}", state)];
    if let Some(token) = body["session_token"].as_str() {
        lines.push(format!("  Token:     {}", token));
    }
    lines.push(format!("  Progress:  {}/{}", processed, total));
    if let Some(key) = body["current_key"].as_str().filter(|k| !k.is_empty()) {
        lines.push(format!("  Current:   {}", key));
    }
    if let Some(name) = body["original_name"].as_str() {
        lines.push(format!("  File:      {}", name));
    }
    if let Some(error) = body["error"].as_str() {
        lines.push(format!("  Error:     {}", error));
    }
    if body["parameters_match"].as_bool() == Some(false) {
        lines.push("  Note:      the running job was started with different parameters".to_string());
    }
    lines
}

/// rankflow status
pub async fn cmd_status(
    host: &str,
    port: u16,
    poller: &PollerParams,
    json: bool,
) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/status", base_url(host, port));

    let response = client
        .get(&url)
        .query(poller)
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        anyhow::bail!("{}", error_message(&body, "Service returned an error"));
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    for line in format_status(&body) {
        println!("{}", line);
    }
    Ok(())
}

/// rankflow cancel
pub async fn cmd_cancel(host: &str, port: u16, token: Option<&str>) -> anyhow::Result<()> {
    let client = Client::new();
    let url = format!("{}/cancel", base_url(host, port));

    let mut request = client.post(&url);
    if let Some(token) = token {
        request = request.query(&[("session_token", token)]);
    }
    let response = request
        .send()
        .await
        .map_err(|e| handle_request_error(e, host, port))?;

    let status = response.status();
    let body: Value = response
        .json()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to parse response: {}", e))?;

    if !status.is_success() {
        anyhow::bail!("{}", error_message(&body, "Cancel failed"));
    }

    println!("{}", error_message(&body, "Cancellation requested"));
    Ok(())
}
