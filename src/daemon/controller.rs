use std::any::Any;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use sha2::{Digest, Sha256};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::daemon::events::JobEvent;
use crate::daemon::pacing::{BatchScheduler, CancelSignal, PacingConfig};
use crate::daemon::worker::Worker;
use crate::errors::RankError;
use crate::lookup::RankLookup;
use crate::models::job::{Job, JobState, PollerParams, Snapshot, StartRequest};
use crate::storage::{Dataset, DatasetStore};

/// The shared job record plus what only the controller needs to know about it.
#[derive(Debug, Default)]
pub struct JobSlot {
    pub(crate) job: Job,
    pub(crate) cancel_tx: Option<watch::Sender<bool>>,
    pub(crate) dataset_path: Option<PathBuf>,
}

/// Build a session token: start time in milliseconds, a digest of the job
/// parameters, and the controller's start generation.
pub fn session_token(started_at: DateTime<Utc>, request: &StartRequest, generation: u64) -> String {
    let fingerprint = format!(
        "{}|{}|{}|{}",
        request.device,
        request.location_code,
        request.location_name.as_deref().unwrap_or_default(),
        request.target
    );
    let digest = hex::encode(Sha256::digest(fingerprint.as_bytes()));
    format!(
        "{}-{}-{}",
        started_at.timestamp_millis(),
        &digest[..12],
        generation
    )
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

/// Owner of the single job slot. At most one job runs at a time; callers
/// only ever see snapshots of the record.
pub struct JobController {
    slot: Arc<RwLock<JobSlot>>,
    store: Arc<dyn DatasetStore>,
    events: broadcast::Sender<JobEvent>,
    pacing: PacingConfig,
    generation: AtomicU64,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl JobController {
    pub fn new(
        store: Arc<dyn DatasetStore>,
        events: broadcast::Sender<JobEvent>,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            slot: Arc::new(RwLock::new(JobSlot::default())),
            store,
            events,
            pacing,
            generation: AtomicU64::new(0),
            supervisor: Mutex::new(None),
        }
    }

    /// Accept a job and spawn its worker. Returns the new session token
    /// without waiting for any work to happen.
    pub fn start(
        &self,
        request: StartRequest,
        dataset: Dataset,
        lookup: Arc<dyn RankLookup>,
    ) -> Result<String, RankError> {
        if self.is_running() {
            return Err(busy());
        }

        request.validate()?;
        dataset.job_key_column()?;

        let limit = request.effective_limit();
        let total = limit.map_or(dataset.len(), |l| l.min(dataset.len()));
        let started_at = Utc::now();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = session_token(started_at, &request, generation);
        let job_id = Uuid::now_v7();
        let (cancel_tx, cancel) = CancelSignal::channel();

        {
            let mut slot = self.slot.write();
            if slot.job.is_running() {
                return Err(busy());
            }
            slot.job = Job::running(job_id, token.clone(), &request, total, started_at);
            slot.cancel_tx = Some(cancel_tx);
            slot.dataset_path = Some(request.dataset_path.clone());
        }

        tracing::info!(
            job_id = %job_id,
            total,
            site = %request.target,
            device = %request.device,
            "Job started"
        );
        let _ = self.events.send(JobEvent::Started {
            job_id,
            session_token: token.clone(),
            total,
            timestamp: started_at,
        });

        let worker = Worker::new(
            job_id,
            Arc::clone(&self.slot),
            Arc::clone(&self.store),
            lookup,
            self.events.clone(),
            BatchScheduler::new(self.pacing),
            cancel,
            request.target.clone(),
            request.lookup_params(),
            dataset,
            request.dataset_path,
            limit,
        );
        let task = tokio::spawn(worker.run());

        let slot = Arc::clone(&self.slot);
        let events = self.events.clone();
        let supervisor = tokio::spawn(async move {
            if let Err(e) = task.await {
                let message = if e.is_panic() {
                    format!("Worker panicked: {}", panic_message(e.into_panic()))
                } else {
                    "Worker task was aborted".to_string()
                };
                tracing::error!(job_id = %job_id, "{}", message);
                fail_abandoned(&slot, job_id, message, &events);
            }
        });
        *self.supervisor.lock() = Some(supervisor);

        Ok(token)
    }

    pub fn status(&self, poller: &PollerParams) -> Snapshot {
        let slot = self.slot.read();
        Snapshot {
            job: slot.job.clone(),
            is_processing: slot.job.is_running(),
            parameters_match: slot.job.parameters_match(poller),
        }
    }

    /// Ask the running job to stop. A supplied token must match it.
    pub fn cancel(&self, session_token: Option<&str>) -> Result<(), RankError> {
        let slot = self.slot.read();
        if !slot.job.is_running() {
            return Err(RankError::NotRunning(
                "No job is currently running".to_string(),
            ));
        }
        if let Some(token) = session_token.map(str::trim).filter(|t| !t.is_empty()) {
            if slot.job.session_token.as_deref() != Some(token) {
                return Err(RankError::TokenMismatch(
                    "Session token does not match the running job".to_string(),
                ));
            }
        }
        if let Some(tx) = &slot.cancel_tx {
            let _ = tx.send(true);
        }
        tracing::info!(job_id = ?slot.job.job_id, "Cancellation requested");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.events.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.slot.read().job.is_running()
    }

    pub fn state(&self) -> JobState {
        self.slot.read().job.state
    }

    /// Path of the dataset the current (or last) job writes to.
    pub fn dataset_path(&self) -> Option<PathBuf> {
        self.slot.read().dataset_path.clone()
    }

    /// Wait for the most recently started job to reach a terminal state.
    pub async fn join(&self) {
        let handle = self.supervisor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Like [`join`](Self::join) but gives up after `timeout`. Returns
    /// whether the job finished in time.
    pub async fn wait_for_idle(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.join()).await.is_ok() || !self.is_running()
    }
}

fn busy() -> RankError {
    RankError::Busy("Already processing a file. Please wait.".to_string())
}

/// Move a job whose worker died without finishing into `Failed`.
fn fail_abandoned(
    slot: &RwLock<JobSlot>,
    job_id: Uuid,
    message: String,
    events: &broadcast::Sender<JobEvent>,
) {
    let event = {
        let mut slot = slot.write();
        if slot.job.job_id != Some(job_id) || !slot.job.is_running() {
            return;
        }
        slot.job.state = JobState::Failed;
        slot.job.processed = slot.job.total;
        slot.job.error = Some(message);
        slot.job.finished_at = Some(Utc::now());
        slot.cancel_tx = None;
        JobEvent::Finished {
            job_id,
            state: JobState::Failed,
            processed: slot.job.processed,
            total: slot.job.total,
            error: slot.job.error.clone(),
            timestamp: Utc::now(),
        }
    };
    let _ = events.send(event);
}
