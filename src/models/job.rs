use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::RankError;
use crate::models::rank::{Device, LookupParams, RankRecord};

/// `current_key` value once a job has run to completion.
pub const COMPLETED_MARKER: &str = "Completed";
/// `current_key` value once a job has been cancelled.
pub const CANCELLED_MARKER: &str = "Cancelled";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// The record describing the in-flight or last finished run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Job {
    pub job_id: Option<Uuid>,
    pub state: JobState,
    pub session_token: Option<String>,
    pub total: usize,
    pub processed: usize,
    pub current_key: String,
    pub results: Vec<RankRecord>,
    pub error: Option<String>,
    pub dataset_ref: Option<String>,
    pub original_name: Option<String>,
    pub target: Option<String>,
    pub device: Option<Device>,
    pub location_code: Option<u32>,
    pub location_name: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// A fresh `Running` record for an accepted start request.
    pub fn running(
        job_id: Uuid,
        session_token: String,
        request: &StartRequest,
        total: usize,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            job_id: Some(job_id),
            state: JobState::Running,
            session_token: Some(session_token),
            total,
            processed: 0,
            current_key: String::new(),
            results: Vec::with_capacity(total),
            error: None,
            dataset_ref: Some(request.dataset_ref.clone()),
            original_name: Some(request.original_name.clone()),
            target: Some(request.target.clone()),
            device: Some(request.device),
            location_code: Some(request.location_code),
            location_name: request.location_name.clone(),
            started_at: Some(started_at),
            finished_at: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.state == JobState::Running
    }

    /// Decide whether a poller's expectation refers to this job.
    ///
    /// A session token is authoritative. Without one, the device/location
    /// fields are compared against a running job only, and an omitted field
    /// counts as a match, so callers relying on fields alone can be told
    /// "match" for a job they did not start.
    pub fn parameters_match(&self, poller: &PollerParams) -> bool {
        if let Some(token) = poller.session_token() {
            return self.session_token.as_deref() == Some(token);
        }

        if !self.is_running() {
            return true;
        }

        let device_matches = poller.device().map_or(true, |device| {
            self.device
                .map_or(false, |d| d.as_str().eq_ignore_ascii_case(device))
        });
        let code_matches = poller.location_code().map_or(true, |code| {
            self.location_code
                .map_or(false, |c| c.to_string() == code)
        });
        let name_matches = poller.location_name().map_or(true, |name| {
            self.location_name
                .as_deref()
                .map_or(false, |n| n.eq_ignore_ascii_case(name))
        });

        device_matches && code_matches && name_matches
    }
}

/// Parameters of a start request, validated by the job controller.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub target: String,
    pub location_code: u32,
    pub location_name: Option<String>,
    pub device: Device,
    pub language_code: String,
    /// Truncate the key list to its first N entries; `None` or `Some(0)` means all.
    pub limit: Option<usize>,
    pub dataset_ref: String,
    pub dataset_path: PathBuf,
    pub original_name: String,
}

impl StartRequest {
    pub fn validate(&self) -> Result<(), RankError> {
        if self.target.trim().is_empty() {
            return Err(RankError::Validation(
                "Missing required field: target_url".to_string(),
            ));
        }
        if self.dataset_ref.trim().is_empty() {
            return Err(RankError::Validation(
                "Missing dataset reference".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lookup_params(&self) -> LookupParams {
        LookupParams {
            location_code: self.location_code,
            location_name: self.location_name.clone(),
            device: self.device,
            language_code: self.language_code.clone(),
        }
    }

    pub fn effective_limit(&self) -> Option<usize> {
        self.limit.filter(|l| *l > 0)
    }
}

/// What a status poller tells us about the job it believes it is watching.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PollerParams {
    pub session_token: Option<String>,
    pub device: Option<String>,
    pub location_code: Option<String>,
    pub location_name: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl PollerParams {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            session_token: Some(token.into()),
            ..Default::default()
        }
    }

    pub fn session_token(&self) -> Option<&str> {
        non_empty(&self.session_token)
    }

    pub fn device(&self) -> Option<&str> {
        non_empty(&self.device)
    }

    pub fn location_code(&self) -> Option<&str> {
        non_empty(&self.location_code)
    }

    pub fn location_name(&self) -> Option<&str> {
        non_empty(&self.location_name)
    }
}

/// Point-in-time copy of the job record handed to pollers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snapshot {
    #[serde(flatten)]
    pub job: Job,
    pub is_processing: bool,
    pub parameters_match: bool,
}
