use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::log_storage::{ChangeLogStorage, DeadLetterSink, LogEntry, LogEntryId};

/// Per-entry verdict from a batch processor.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDisposition {
    Processed,
    /// Route this entry to the dead-letter sink. The cursor still advances
    /// past it; dead-lettered entries are not auto-retried.
    DeadLetter { reason: String },
}

/// Caller-supplied handler for one batch of change-log entries.
///
/// Returns one disposition per entry, in order. A short return is padded
/// with `Processed` — acknowledgement is batch-granular either way.
#[async_trait]
pub trait BatchProcessor: Send + Sync {
    async fn process(&self, batch: &[LogEntry]) -> Vec<EntryDisposition>;
}

/// One consumer group's drain loop over a per-type change log.
///
/// The cursor is owned exclusively by this consumer: a fresh group starts
/// at the log tail, a group with a committed cursor resumes exactly there,
/// so a paused group catches up instead of losing entries. The cursor is
/// committed only after the whole batch has been handed to the processor
/// and dead letters routed.
pub struct LogConsumer {
    log: Arc<dyn ChangeLogStorage>,
    dead_letters: Arc<dyn DeadLetterSink>,
    processor: Arc<dyn BatchProcessor>,
    topic: String,
    group: String,
    batch_max: usize,
    read_timeout: Duration,
    cursor: Option<LogEntryId>,
    initialized: bool,
}

impl LogConsumer {
    pub fn new(
        log: Arc<dyn ChangeLogStorage>,
        dead_letters: Arc<dyn DeadLetterSink>,
        processor: Arc<dyn BatchProcessor>,
        topic: impl Into<String>,
        group: impl Into<String>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            log,
            dead_letters,
            processor,
            topic: topic.into(),
            group: group.into(),
            batch_max: config.log_batch_max,
            read_timeout: config.log_read_timeout,
            cursor: None,
            initialized: false,
        }
    }

    async fn ensure_cursor(&mut self) -> Result<(), SyncError> {
        if self.initialized {
            return Ok(());
        }
        self.cursor = match self.log.committed_cursor(&self.topic, &self.group).await? {
            Some(committed) => Some(committed),
            None => self.log.latest_id(&self.topic).await?,
        };
        self.initialized = true;
        Ok(())
    }

    /// Block for up to the configured read timeout, process at most one
    /// batch, commit the cursor past it. Returns how many entries were
    /// handed to the processor (zero on timeout).
    pub async fn poll_once(&mut self) -> Result<usize, SyncError> {
        self.ensure_cursor().await?;
        let batch = self
            .log
            .read_after(&self.topic, self.cursor, self.batch_max, self.read_timeout)
            .await?;
        if batch.is_empty() {
            return Ok(0);
        }

        let dispositions = self.processor.process(&batch).await;
        for (i, entry) in batch.iter().enumerate() {
            if let Some(EntryDisposition::DeadLetter { reason }) = dispositions.get(i) {
                tracing::warn!(
                    topic = %self.topic,
                    group = %self.group,
                    entry = %entry.id,
                    reason = %reason,
                    "routing unprocessable entry to dead letters"
                );
                self.dead_letters
                    .route(&self.topic, &self.group, entry, reason)
                    .await?;
            }
        }

        let last = batch.last().expect("batch is non-empty").id;
        self.log.commit_cursor(&self.topic, &self.group, last).await?;
        self.cursor = Some(last);
        tracing::debug!(
            topic = %self.topic,
            group = %self.group,
            entries = batch.len(),
            cursor = %last,
            "batch committed"
        );
        Ok(batch.len())
    }

    /// Drain until cancelled. Shutdown is observed between polls; each
    /// poll's wait is bounded by the configured read timeout. Errors
    /// propagate — the caller owns retry policy.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<(), SyncError> {
        while !cancel.is_cancelled() {
            self.poll_once().await?;
        }
        Ok(())
    }
}
