use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::models::job::JobState;

/// Lifecycle notifications pushed to `/events` subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data")]
pub enum JobEvent {
    Started {
        job_id: Uuid,
        session_token: String,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    Progress {
        job_id: Uuid,
        keyword: String,
        processed: usize,
        total: usize,
        timestamp: DateTime<Utc>,
    },
    BatchPersisted {
        job_id: Uuid,
        batch: usize,
        batches: usize,
        timestamp: DateTime<Utc>,
    },
    Finished {
        job_id: Uuid,
        state: JobState,
        processed: usize,
        total: usize,
        error: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Progress { job_id, .. }
            | JobEvent::BatchPersisted { job_id, .. }
            | JobEvent::Finished { job_id, .. } => *job_id,
        }
    }
}
