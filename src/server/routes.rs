use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::errors::RankError;
use crate::lookup::{rank_keywords, Credentials};
use crate::models::job::{PollerParams, StartRequest};
use crate::models::rank::{Device, LookupParams};
use crate::storage::Dataset;

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

fn error_response(status: StatusCode, error: &str, message: &str) -> impl IntoResponse {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            message: message.to_string(),
        }),
    )
}

pub fn status_for(err: &RankError) -> StatusCode {
    match err {
        RankError::Validation(_) => StatusCode::BAD_REQUEST,
        RankError::Busy(_) | RankError::NotRunning(_) | RankError::TokenMismatch(_) => {
            StatusCode::CONFLICT
        }
        RankError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rank_error_response(context: &str, err: RankError) -> Response {
    tracing::warn!("{} failed: {}", context, err);
    error_response(status_for(&err), err.code(), &err.to_string()).into_response()
}

fn csv_attachment(filename: &str, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        bytes,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Upload form
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    file_bytes: Option<Vec<u8>>,
    target_url: Option<String>,
    api_login: Option<String>,
    api_password: Option<String>,
    location_code: Option<String>,
    location_name: Option<String>,
    device: Option<String>,
    limit: Option<String>,
    test_mode: Option<String>,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_truthy(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true" | "1" | "on" | "yes")
    )
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, RankError> {
    let invalid = |e: axum::extract::multipart::MultipartError| {
        RankError::Validation(format!("Invalid multipart body: {}", e))
    };

    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "csv_file" {
            form.file_name = field.file_name().map(str::to_string);
            form.file_bytes = Some(field.bytes().await.map_err(invalid)?.to_vec());
            continue;
        }
        let value = field.text().await.map_err(invalid)?;
        match name.as_str() {
            "target_url" => form.target_url = Some(value),
            "api_login" => form.api_login = Some(value),
            "api_password" => form.api_password = Some(value),
            "location_code" => form.location_code = Some(value),
            "location_name" => form.location_name = Some(value),
            "device" => form.device = Some(value),
            "limit" => form.limit = Some(value),
            "test_mode" => form.test_mode = Some(value),
            other => tracing::debug!("Ignoring unknown upload field '{}'", other),
        }
    }
    Ok(form)
}

fn parse_location_code(value: Option<String>, default: u32) -> Result<u32, RankError> {
    match non_blank(value) {
        Some(code) => code
            .parse()
            .map_err(|_| RankError::Validation(format!("Invalid location_code '{}'", code))),
        None => Ok(default),
    }
}

fn parse_device(value: Option<String>, default: &str) -> Result<Device, RankError> {
    non_blank(value).as_deref().unwrap_or(default).parse()
}

fn parse_limit(value: Option<String>) -> Result<Option<usize>, RankError> {
    match non_blank(value) {
        Some(limit) => limit
            .parse()
            .map(Some)
            .map_err(|_| RankError::Validation(format!("Invalid limit '{}'", limit))),
        None => Ok(None),
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub message: String,
    pub session_token: String,
    pub file_id: String,
    pub status_url: String,
}

/// POST /upload
pub async fn upload(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    match start_upload(&state, multipart).await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => rank_error_response("Upload", e),
    }
}

async fn start_upload(
    state: &AppState,
    multipart: Multipart,
) -> Result<UploadResponse, RankError> {
    let form = read_upload_form(multipart).await?;

    let target = non_blank(form.target_url.clone()).ok_or_else(|| {
        RankError::Validation("Missing required field: target_url".to_string())
    })?;
    let bytes = form
        .file_bytes
        .ok_or_else(|| RankError::Validation("No file uploaded".to_string()))?;
    let original_name = non_blank(form.file_name)
        .ok_or_else(|| RankError::Validation("No file selected".to_string()))?;

    let location_code =
        parse_location_code(form.location_code, state.config.default_location_code)?;
    let device = parse_device(form.device, &state.config.default_device)?;
    let limit = parse_limit(form.limit)?;
    let test_mode = is_truthy(form.test_mode.as_deref());
    let credentials =
        Credentials::from_parts(form.api_login.as_deref(), form.api_password.as_deref());
    let lookup = state.lookups.build(credentials.as_ref(), test_mode)?;

    let dataset = Dataset::parse(&bytes)
        .map_err(|e| RankError::Validation(format!("Invalid CSV file: {}", e)))?;

    // Identical uploads share a file, so never overwrite one a job is writing.
    if state.controller.is_running() {
        return Err(RankError::Busy(
            "Already processing a file. Please wait.".to_string(),
        ));
    }
    dataset.job_key_column()?;
    let (file_id, dataset_path) = state.uploads.store(&original_name, &bytes).await?;

    let request = StartRequest {
        target,
        location_code,
        location_name: non_blank(form.location_name),
        device,
        language_code: state.config.language_code.clone(),
        limit,
        dataset_ref: file_id.clone(),
        dataset_path,
        original_name,
    };
    let session_token = state.controller.start(request, dataset, lookup)?;

    Ok(UploadResponse {
        message: "File uploaded and processing started".to_string(),
        status_url: format!("/status?session_token={}", session_token),
        session_token,
        file_id,
    })
}

/// GET /status
pub async fn status(
    State(state): State<Arc<AppState>>,
    Query(poller): Query<PollerParams>,
) -> impl IntoResponse {
    Json(state.controller.status(&poller))
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelParams {
    pub session_token: Option<String>,
}

/// POST /cancel
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CancelParams>,
) -> Response {
    match state.controller.cancel(params.session_token.as_deref()) {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({ "message": "Cancellation requested" })),
        )
            .into_response(),
        Err(e) => rank_error_response("Cancel", e),
    }
}

/// GET /download
pub async fn download(State(state): State<Arc<AppState>>) -> Response {
    let Some(path) = state.controller.dataset_path() else {
        return error_response(
            StatusCode::NOT_FOUND,
            "not_found",
            "No processed file available",
        )
        .into_response();
    };

    match state.store.read_bytes(&path).await {
        Ok(bytes) => {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "rankings.csv".to_string());
            csv_attachment(&filename, bytes)
        }
        Err(e) => rank_error_response("Download", e),
    }
}

/// GET /download-api/{file_id}
pub async fn download_api(
    State(state): State<Arc<AppState>>,
    Path(file_id): Path<String>,
) -> Response {
    let path = match state.uploads.resolve(&file_id) {
        Ok(path) => path,
        Err(e) => return rank_error_response("Download", e),
    };
    match state.store.read_bytes(&path).await {
        Ok(bytes) => csv_attachment(&file_id, bytes),
        Err(RankError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "not_found", "File not found").into_response()
        }
        Err(e) => rank_error_response("Download", e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ApiCredentials {
    pub login: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckRankingsRequest {
    pub target_url: Option<String>,
    pub api_credentials: Option<ApiCredentials>,
    pub location_code: Option<u32>,
    pub location_name: Option<String>,
    pub device: Option<String>,
    pub limit: Option<usize>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub test_mode: bool,
}

/// POST /check-rankings
pub async fn check_rankings(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CheckRankingsRequest>,
) -> Response {
    let Some(target) = non_blank(body.target_url) else {
        return rank_error_response(
            "Check rankings",
            RankError::Validation("Missing required parameters: target_url".to_string()),
        );
    };
    let credentials = body.api_credentials.as_ref().and_then(|c| {
        Credentials::from_parts(c.login.as_deref(), c.password.as_deref())
    });
    let lookup = match state.lookups.build(credentials.as_ref(), body.test_mode) {
        Ok(lookup) => lookup,
        Err(e) => return rank_error_response("Check rankings", e),
    };
    if body.keywords.is_empty() {
        return rank_error_response(
            "Check rankings",
            RankError::Validation("No keywords provided".to_string()),
        );
    }
    let device = match parse_device(body.device, &state.config.default_device) {
        Ok(device) => device,
        Err(e) => return rank_error_response("Check rankings", e),
    };

    let mut keywords = body.keywords;
    if let Some(limit) = body.limit.filter(|l| *l > 0) {
        keywords.truncate(limit);
    }
    let params = LookupParams {
        location_code: body
            .location_code
            .unwrap_or(state.config.default_location_code),
        location_name: non_blank(body.location_name),
        device,
        language_code: state.config.language_code.clone(),
    };

    tracing::info!("Checking {} keywords for {}", keywords.len(), target);
    let results = rank_keywords(lookup.as_ref(), &keywords, &target, &params).await;
    (StatusCode::OK, Json(serde_json::json!({ "results": results }))).into_response()
}
