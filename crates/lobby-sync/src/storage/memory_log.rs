use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::error::SyncError;
use crate::log_storage::{ChangeLogStorage, LogEntry, LogEntryId};
use crate::snapshot::ChangeRecord;

/// In-memory change log for testing and single-process deployments.
///
/// One notifier covers all topics; a waiting reader re-checks its own
/// topic after every wakeup, so cross-topic appends cost at most a spurious
/// scan.
pub struct MemoryChangeLogStorage {
    inner: Mutex<HashMap<String, Topic>>,
    notify: Notify,
}

#[derive(Default)]
struct Topic {
    next_id: i64,
    entries: VecDeque<LogEntry>,
    cursors: HashMap<String, LogEntryId>,
}

impl MemoryChangeLogStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Number of retained entries in `topic`.
    pub fn entry_count(&self, topic: &str) -> usize {
        self.inner
            .lock()
            .get(topic)
            .map(|t| t.entries.len())
            .unwrap_or(0)
    }

    fn collect_after(
        topic: &Topic,
        after: Option<LogEntryId>,
        max: usize,
    ) -> Vec<LogEntry> {
        topic
            .entries
            .iter()
            .filter(|e| after.map_or(true, |a| e.id > a))
            .take(max)
            .cloned()
            .collect()
    }
}

impl Default for MemoryChangeLogStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChangeLogStorage for MemoryChangeLogStorage {
    async fn append(&self, topic: &str, record: ChangeRecord) -> Result<LogEntryId, SyncError> {
        let id = {
            let mut inner = self.inner.lock();
            let topic = inner.entry(topic.to_string()).or_default();
            topic.next_id += 1;
            let id = LogEntryId(topic.next_id);
            topic.entries.push_back(LogEntry {
                id,
                appended_at: Utc::now(),
                record,
            });
            id
        };
        self.notify.notify_waiters();
        Ok(id)
    }

    async fn read_after(
        &self,
        topic: &str,
        after: Option<LogEntryId>,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<LogEntry>, SyncError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            // Register for wakeups before checking, so an append between
            // the check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let inner = self.inner.lock();
                if let Some(t) = inner.get(topic) {
                    let batch = Self::collect_after(t, after, max);
                    if !batch.is_empty() {
                        return Ok(batch);
                    }
                }
            }

            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn latest_id(&self, topic: &str) -> Result<Option<LogEntryId>, SyncError> {
        Ok(self
            .inner
            .lock()
            .get(topic)
            .and_then(|t| t.entries.back().map(|e| e.id)))
    }

    async fn committed_cursor(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Option<LogEntryId>, SyncError> {
        Ok(self
            .inner
            .lock()
            .get(topic)
            .and_then(|t| t.cursors.get(group).copied()))
    }

    async fn commit_cursor(
        &self,
        topic: &str,
        group: &str,
        cursor: LogEntryId,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock();
        let topic = inner.entry(topic.to_string()).or_default();
        topic.cursors.insert(group.to_string(), cursor);
        Ok(())
    }

    async fn trim(&self, topic: &str, older_than: Duration) -> Result<usize, SyncError> {
        let older_than = chrono::Duration::from_std(older_than).map_err(|e| {
            SyncError::Persistence {
                reason: format!("log retention out of range: {older_than:?}"),
                source: Some(Box::new(e)),
            }
        })?;
        let cutoff = Utc::now() - older_than;
        let mut inner = self.inner.lock();
        let Some(topic) = inner.get_mut(topic) else {
            return Ok(0);
        };
        let before = topic.entries.len();
        topic.entries.retain(|e| e.appended_at >= cutoff);
        Ok(before - topic.entries.len())
    }
}
