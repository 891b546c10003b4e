use std::ops::Range;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::models::config::ServiceConfig;

pub const INTERACTIVE_BATCH_SIZE: usize = 5;
pub const CLI_BATCH_SIZE: usize = 10;
const DEFAULT_ITEM_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_BATCH_DELAY: Duration = Duration::from_secs(5);

/// Batch size and delays for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    pub batch_size: usize,
    /// Minimum spacing between consecutive collaborator calls.
    pub item_delay: Duration,
    /// Pause after each persisted batch except the last.
    pub batch_delay: Duration,
}

impl PacingConfig {
    pub fn new(batch_size: usize, item_delay: Duration, batch_delay: Duration) -> Self {
        Self {
            batch_size: batch_size.max(1),
            item_delay,
            batch_delay,
        }
    }

    pub fn interactive() -> Self {
        Self::new(INTERACTIVE_BATCH_SIZE, DEFAULT_ITEM_DELAY, DEFAULT_BATCH_DELAY)
    }

    pub fn cli() -> Self {
        Self::new(CLI_BATCH_SIZE, DEFAULT_ITEM_DELAY, DEFAULT_BATCH_DELAY)
    }

    /// No delays at all.
    pub fn immediate(batch_size: usize) -> Self {
        Self::new(batch_size, Duration::ZERO, Duration::ZERO)
    }

    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.batch_size, config.item_delay(), config.batch_delay())
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self::new(batch_size, self.item_delay, self.batch_delay)
    }
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self::interactive()
    }
}

/// Receiving side of a job's cancellation flag.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn channel() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(&mut self) {
        // A dropped sender can never cancel.
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Sleep for `duration` unless cancelled first. Returns `false` on cancel.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return false;
        }
        if duration.is_zero() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => true,
            _ = self.cancelled() => false,
        }
    }
}

/// Splits a key list into batches and paces the calls made for it.
#[derive(Debug)]
pub struct BatchScheduler {
    config: PacingConfig,
    last_call: Option<Instant>,
}

impl BatchScheduler {
    pub fn new(config: PacingConfig) -> Self {
        Self {
            config,
            last_call: None,
        }
    }

    pub fn batches(&self, total: usize) -> Vec<Range<usize>> {
        let size = self.config.batch_size.max(1);
        (0..total)
            .step_by(size)
            .map(|start| start..(start + size).min(total))
            .collect()
    }

    /// Wait until at least `item_delay` has passed since the previous call,
    /// then claim the slot. Returns `false` if cancelled while waiting.
    pub async fn wait_for_call_slot(&mut self, cancel: &mut CancelSignal) -> bool {
        if let Some(last) = self.last_call {
            let elapsed = last.elapsed();
            if elapsed < self.config.item_delay
                && !cancel.sleep(self.config.item_delay - elapsed).await
            {
                return false;
            }
        }
        if cancel.is_cancelled() {
            return false;
        }
        self.last_call = Some(Instant::now());
        true
    }

    /// Inter-batch pause, skipped after the last batch. Once the last batch
    /// is persisted the job is done, so a late cancellation is ignored.
    pub async fn wait_between_batches(
        &self,
        batch_index: usize,
        batch_count: usize,
        cancel: &mut CancelSignal,
    ) -> bool {
        if batch_index + 1 >= batch_count {
            return true;
        }
        cancel.sleep(self.config.batch_delay).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batches_split_evenly_and_remainder() {
        let scheduler = BatchScheduler::new(PacingConfig::immediate(2));
        assert_eq!(scheduler.batches(5), vec![0..2, 2..4, 4..5]);
        assert_eq!(scheduler.batches(4), vec![0..2, 2..4]);
        assert!(scheduler.batches(0).is_empty());
    }

    #[test]
    fn test_batch_size_clamped_to_one() {
        let config = PacingConfig::immediate(0);
        assert_eq!(config.batch_size, 1);
        assert_eq!(BatchScheduler::new(config).batches(2), vec![0..1, 1..2]);
    }

    #[test]
    fn test_presets() {
        assert_eq!(PacingConfig::interactive().batch_size, 5);
        assert_eq!(PacingConfig::cli().batch_size, 10);
        assert_eq!(PacingConfig::cli().item_delay, Duration::from_secs(1));
        assert_eq!(PacingConfig::interactive().batch_delay, Duration::from_secs(5));

        let config = ServiceConfig {
            batch_size: 7,
            item_delay_ms: 10,
            batch_delay_ms: 20,
            ..Default::default()
        };
        let pacing = PacingConfig::from_config(&config);
        assert_eq!(pacing.batch_size, 7);
        assert_eq!(pacing.item_delay, Duration::from_millis(10));
        assert_eq!(pacing.with_batch_size(3).batch_size, 3);
    }

    #[tokio::test]
    async fn test_call_slot_spacing() {
        let (_tx, mut cancel) = CancelSignal::channel();
        let mut scheduler = BatchScheduler::new(PacingConfig::new(
            5,
            Duration::from_millis(50),
            Duration::ZERO,
        ));

        let start = std::time::Instant::now();
        assert!(scheduler.wait_for_call_slot(&mut cancel).await);
        assert!(scheduler.wait_for_call_slot(&mut cancel).await);
        assert!(scheduler.wait_for_call_slot(&mut cancel).await);
        assert!(
            start.elapsed() >= Duration::from_millis(100),
            "Three calls should span at least two intervals"
        );
    }

    #[tokio::test]
    async fn test_cancel_interrupts_sleep() {
        let (tx, mut cancel) = CancelSignal::channel();
        let waiter = tokio::spawn(async move { cancel.sleep(Duration::from_secs(30)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(true).expect("send");

        let completed = tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .expect("sleep should end promptly")
            .expect("join");
        assert!(!completed);
    }

    #[tokio::test]
    async fn test_dropped_sender_never_cancels() {
        let (tx, mut cancel) = CancelSignal::channel();
        drop(tx);
        assert!(cancel.sleep(Duration::from_millis(10)).await);
        assert!(!cancel.is_cancelled());
    }

    #[tokio::test]
    async fn test_no_wait_after_last_batch() {
        let (_tx, mut cancel) = CancelSignal::channel();
        let scheduler = BatchScheduler::new(PacingConfig::new(
            1,
            Duration::ZERO,
            Duration::from_secs(30),
        ));
        let done = tokio::time::timeout(
            Duration::from_secs(1),
            scheduler.wait_between_batches(2, 3, &mut cancel),
        )
        .await
        .expect("last batch must not wait");
        assert!(done);
    }

    #[tokio::test]
    async fn test_cancel_after_last_batch_is_ignored() {
        let (tx, mut cancel) = CancelSignal::channel();
        let scheduler = BatchScheduler::new(PacingConfig::immediate(2));
        tx.send(true).unwrap();
        assert!(scheduler.wait_between_batches(0, 1, &mut cancel).await);
        assert!(!scheduler.wait_between_batches(0, 2, &mut cancel).await);
    }
}
