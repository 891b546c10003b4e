use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::daemon::controller::JobSlot;
use crate::daemon::events::JobEvent;
use crate::daemon::pacing::{BatchScheduler, CancelSignal};
use crate::lookup::{CacheKey, LookupCache, RankLookup};
use crate::models::job::{JobState, CANCELLED_MARKER, COMPLETED_MARKER};
use crate::models::rank::{LookupParams, RankRecord, OUTPUT_COLUMNS};
use crate::storage::{Dataset, DatasetStore};

enum Outcome {
    Completed,
    Cancelled,
    Failed(String),
}

/// Drives one job from its first key to a terminal state.
///
/// Every write to the shared slot is guarded by `job_id`, so a worker can
/// never touch a record that a later start has replaced.
pub(crate) struct Worker {
    job_id: Uuid,
    slot: Arc<RwLock<JobSlot>>,
    store: Arc<dyn DatasetStore>,
    lookup: Arc<dyn RankLookup>,
    events: broadcast::Sender<JobEvent>,
    scheduler: BatchScheduler,
    cancel: CancelSignal,
    target: String,
    params: LookupParams,
    dataset: Dataset,
    dataset_path: PathBuf,
    limit: Option<usize>,
    /// Result of the final key, committed together with the terminal state.
    pending: Option<(RankRecord, Option<String>)>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        job_id: Uuid,
        slot: Arc<RwLock<JobSlot>>,
        store: Arc<dyn DatasetStore>,
        lookup: Arc<dyn RankLookup>,
        events: broadcast::Sender<JobEvent>,
        scheduler: BatchScheduler,
        cancel: CancelSignal,
        target: String,
        params: LookupParams,
        dataset: Dataset,
        dataset_path: PathBuf,
        limit: Option<usize>,
    ) -> Self {
        Self {
            job_id,
            slot,
            store,
            lookup,
            events,
            scheduler,
            cancel,
            target,
            params,
            dataset,
            dataset_path,
            limit,
            pending: None,
        }
    }

    pub(crate) async fn run(mut self) {
        tracing::info!(job_id = %self.job_id, path = %self.dataset_path.display(), "Worker started");
        let outcome = self.process().await;
        self.finish(outcome);
    }

    async fn process(&mut self) -> Outcome {
        let key_column = match self.dataset.key_column() {
            Ok(column) => column,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        self.dataset.ensure_columns(&OUTPUT_COLUMNS);

        let keys = self.dataset.keys(key_column, self.limit);
        let total = keys.len();
        let batches = self.scheduler.batches(total);
        let mut cache = LookupCache::new();

        for (batch_index, range) in batches.iter().enumerate() {
            for index in range.clone() {
                if self.cancel.is_cancelled() {
                    self.persist_partial().await;
                    return Outcome::Cancelled;
                }

                let keyword = &keys[index];
                self.set_current_key(keyword);

                let cache_key = CacheKey::new(keyword, &self.target, &self.params);
                let outcome = match cache.get(&cache_key) {
                    Some(outcome) => {
                        tracing::debug!(keyword = %keyword, "Using cached result");
                        outcome
                    }
                    None => {
                        if !self.scheduler.wait_for_call_slot(&mut self.cancel).await {
                            self.persist_partial().await;
                            return Outcome::Cancelled;
                        }
                        let outcome = self
                            .lookup
                            .lookup(keyword, &self.target, &self.params)
                            .await;
                        cache.insert(cache_key, outcome.clone());
                        outcome
                    }
                };

                let error = outcome.as_ref().err().map(|e| {
                    let message = format!("Error processing keyword '{}': {}", keyword, e);
                    tracing::warn!("{}", message);
                    message
                });

                let record = RankRecord::from_outcome(keyword, &outcome, self.params.device);
                self.dataset
                    .update_rows_by_key(key_column, keyword, &record.cells());

                if index + 1 == total {
                    self.pending = Some((record, error));
                } else {
                    self.commit(record, error, index + 1, total);
                }
            }

            if let Err(e) = self.store.save(&self.dataset_path, &self.dataset).await {
                return Outcome::Failed(format!("Error processing CSV file: {}", e));
            }
            tracing::debug!(
                job_id = %self.job_id,
                batch = batch_index + 1,
                batches = batches.len(),
                "Batch persisted"
            );
            let _ = self.events.send(JobEvent::BatchPersisted {
                job_id: self.job_id,
                batch: batch_index + 1,
                batches: batches.len(),
                timestamp: Utc::now(),
            });

            if !self
                .scheduler
                .wait_between_batches(batch_index, batches.len(), &mut self.cancel)
                .await
            {
                return Outcome::Cancelled;
            }
        }

        tracing::debug!(
            job_id = %self.job_id,
            cached = cache.len(),
            hits = cache.hits(),
            "Lookups finished"
        );
        Outcome::Completed
    }

    async fn persist_partial(&self) {
        if let Err(e) = self.store.save(&self.dataset_path, &self.dataset).await {
            tracing::warn!(job_id = %self.job_id, "Failed to persist cancelled job: {}", e);
        }
    }

    fn set_current_key(&self, keyword: &str) {
        let mut slot = self.slot.write();
        if slot.job.job_id == Some(self.job_id) {
            slot.job.current_key = keyword.to_string();
        }
    }

    fn commit(&self, record: RankRecord, error: Option<String>, processed: usize, total: usize) {
        let keyword = record.keyword.clone();
        {
            let mut slot = self.slot.write();
            if slot.job.job_id != Some(self.job_id) {
                return;
            }
            slot.job.results.push(record);
            slot.job.processed = processed;
            if error.is_some() {
                slot.job.error = error;
            }
        }
        let _ = self.events.send(JobEvent::Progress {
            job_id: self.job_id,
            keyword,
            processed,
            total,
            timestamp: Utc::now(),
        });
    }

    fn finish(mut self, outcome: Outcome) {
        let pending = self.pending.take();
        let event = {
            let mut slot = self.slot.write();
            if slot.job.job_id != Some(self.job_id) {
                return;
            }
            let job = &mut slot.job;

            if let Some((record, error)) = pending {
                job.results.push(record);
                job.processed = job.results.len();
                if error.is_some() {
                    job.error = error;
                }
            }

            match &outcome {
                Outcome::Completed => {
                    job.processed = job.total;
                    job.current_key = COMPLETED_MARKER.to_string();
                    job.state = JobState::Completed;
                }
                Outcome::Failed(message) => {
                    job.processed = job.total;
                    job.error = Some(message.clone());
                    job.state = JobState::Failed;
                }
                Outcome::Cancelled => {
                    job.current_key = CANCELLED_MARKER.to_string();
                    job.state = JobState::Cancelled;
                }
            }
            job.finished_at = Some(Utc::now());

            let event = JobEvent::Finished {
                job_id: self.job_id,
                state: job.state,
                processed: job.processed,
                total: job.total,
                error: job.error.clone(),
                timestamp: Utc::now(),
            };
            slot.cancel_tx = None;
            event
        };

        match &outcome {
            Outcome::Completed => tracing::info!(job_id = %self.job_id, "Job completed"),
            Outcome::Cancelled => tracing::info!(job_id = %self.job_id, "Job cancelled"),
            Outcome::Failed(message) => {
                tracing::error!(job_id = %self.job_id, "Job failed: {}", message)
            }
        }
        let _ = self.events.send(event);
    }
}
