//! DataForSEO SERP client.
//!
//! Posts a single live "advanced" organic task per keyword and scans the
//! organic items for the first URL containing the target domain.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::RankError;
use crate::lookup::{Credentials, RankLookup};
use crate::models::rank::{LookupParams, RankOutcome, NOT_IN_TOP_RESULTS, NO_RESULTS_FOUND};

const SERP_ENDPOINT: &str = "/v3/serp/google/organic/live/advanced";
const STATUS_OK: i64 = 20000;

pub struct DataForSeoClient {
    http: reqwest::Client,
    endpoint: String,
    credentials: Credentials,
}

impl DataForSeoClient {
    pub fn new(
        base_url: &str,
        credentials: Credentials,
        timeout: Duration,
    ) -> Result<Self, RankError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RankError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), SERP_ENDPOINT),
            credentials,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Request body for one keyword. The API takes an array of tasks.
pub fn task_body(keyword: &str, params: &LookupParams) -> Value {
    let mut task = json!({
        "language_code": params.language_code,
        "location_code": params.location_code,
        "keyword": keyword,
        "calculate_rectangles": true,
        "device": params.device.as_str(),
    });
    if let Some(name) = params.location_name.as_deref().filter(|n| !n.is_empty()) {
        task["geo_location"] = Value::String(name.to_string());
    }
    json!([task])
}

fn not_ranked(label: &str) -> RankOutcome {
    RankOutcome::NotRanked {
        label: label.to_string(),
    }
}

/// Organic items of the first task result, or `None` when the response
/// carries none. `items` may be an object with an `organic` array or a flat
/// array of typed items.
fn organic_items(response: &Value) -> Option<Vec<&Value>> {
    let items = response
        .get("tasks")?
        .get(0)?
        .get("result")?
        .get(0)?
        .get("items")?;

    let organic: Vec<&Value> = match items {
        Value::Object(map) => map.get("organic")?.as_array()?.iter().collect(),
        Value::Array(list) => list
            .iter()
            .filter(|item| item.get("type").and_then(Value::as_str) == Some("organic"))
            .collect(),
        _ => return None,
    };

    if organic.is_empty() {
        None
    } else {
        Some(organic)
    }
}

fn url_matches(url: &str, target: &str) -> bool {
    let url = url.to_lowercase();
    let target = target.trim().to_lowercase();
    let without_www = target.replace("www.", "");
    let with_www = format!("www.{}", target);
    url.contains(&target) || url.contains(&without_www) || url.contains(&with_www)
}

/// Interpret a SERP response for `target`.
pub fn find_ranking(response: &Value, target: &str) -> Result<RankOutcome, RankError> {
    let status = response
        .get("status_code")
        .and_then(Value::as_i64)
        .unwrap_or_default();
    if status != STATUS_OK {
        let message = response
            .get("status_message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error");
        return Err(RankError::Lookup(format!(
            "API error. Code: {} Message: {}",
            status, message
        )));
    }

    let Some(organic) = organic_items(response) else {
        return Ok(not_ranked(NO_RESULTS_FOUND));
    };

    for (index, item) in organic.iter().enumerate() {
        let Some(url) = item.get("url").and_then(Value::as_str) else {
            continue;
        };
        if url_matches(url, target) {
            let position = (index + 1) as u32;
            let field = |name: &str| {
                item.get(name)
                    .and_then(Value::as_u64)
                    .map(|v| v as u32)
                    .unwrap_or(position)
            };
            return Ok(RankOutcome::Found {
                position,
                rank_group: field("rank_group"),
                rank_absolute: field("rank_absolute"),
            });
        }
    }

    Ok(not_ranked(NOT_IN_TOP_RESULTS))
}

#[async_trait]
impl RankLookup for DataForSeoClient {
    async fn lookup(
        &self,
        keyword: &str,
        target: &str,
        params: &LookupParams,
    ) -> Result<RankOutcome, RankError> {
        tracing::debug!(
            keyword,
            device = params.device.as_str(),
            location_code = params.location_code,
            "Searching SERP"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .basic_auth(&self.credentials.login, Some(&self.credentials.password))
            .json(&task_body(keyword, params))
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        find_ranking(&body, target)
    }
}
