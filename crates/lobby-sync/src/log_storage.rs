use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::SyncError;
use crate::snapshot::ChangeRecord;

/// Server-assigned id of a change-log entry, strictly increasing per topic
/// in append order.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct LogEntryId(pub i64);

impl std::fmt::Display for LogEntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One appended change record with its id and append time. The append time
/// drives age-based trimming only; ordering is by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: LogEntryId,
    pub appended_at: DateTime<Utc>,
    pub record: ChangeRecord,
}

/// Per-type append-only change log with independent consumer-group
/// cursors.
///
/// Entries are strictly ordered per topic by append order. Cursors are
/// durable and advance batch-granularly; a group with no committed cursor
/// starts at the tail, a group with one resumes exactly there.
#[async_trait]
pub trait ChangeLogStorage: Send + Sync {
    /// Append a record, assigning the next monotonic id for `topic`.
    async fn append(&self, topic: &str, record: ChangeRecord) -> Result<LogEntryId, SyncError>;

    /// Read up to `max` entries with ids greater than `after`, waiting up
    /// to `wait` for at least one to arrive. Returns an empty batch on
    /// timeout so a consumer loop can observe shutdown between polls.
    async fn read_after(
        &self,
        topic: &str,
        after: Option<LogEntryId>,
        max: usize,
        wait: Duration,
    ) -> Result<Vec<LogEntry>, SyncError>;

    /// Id of the newest entry in `topic`, if any.
    async fn latest_id(&self, topic: &str) -> Result<Option<LogEntryId>, SyncError>;

    /// The committed cursor for `group` on `topic`, if it has one.
    async fn committed_cursor(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Option<LogEntryId>, SyncError>;

    /// Durably advance `group`'s cursor on `topic` to `cursor`.
    async fn commit_cursor(
        &self,
        topic: &str,
        group: &str,
        cursor: LogEntryId,
    ) -> Result<(), SyncError>;

    /// Drop entries older than `older_than`. Returns how many were
    /// trimmed. Cursors are untouched; a lagging group simply no longer
    /// sees the trimmed range.
    async fn trim(&self, topic: &str, older_than: Duration) -> Result<usize, SyncError>;
}

/// Sink for entries a consumer flagged as unprocessable. The cursor still
/// advances past them; dead-lettered entries are not auto-retried.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn route(
        &self,
        topic: &str,
        group: &str,
        entry: &LogEntry,
        reason: &str,
    ) -> Result<(), SyncError>;
}
