use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::SyncError;
use crate::log_storage::{DeadLetterSink, LogEntry};

/// One dead-lettered entry with the context it was skipped under.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub topic: String,
    pub group: String,
    pub entry: LogEntry,
    pub reason: String,
}

/// In-memory dead-letter sink that retains everything routed to it, for
/// testing and for single-process deployments that inspect skips manually.
pub struct MemoryDeadLetterSink {
    letters: Mutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetterSink {
    pub fn new() -> Self {
        Self {
            letters: Mutex::new(Vec::new()),
        }
    }

    pub fn letters(&self) -> Vec<DeadLetter> {
        self.letters.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }
}

impl Default for MemoryDeadLetterSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeadLetterSink for MemoryDeadLetterSink {
    async fn route(
        &self,
        topic: &str,
        group: &str,
        entry: &LogEntry,
        reason: &str,
    ) -> Result<(), SyncError> {
        self.letters.lock().push(DeadLetter {
            topic: topic.to_string(),
            group: group.to_string(),
            entry: entry.clone(),
            reason: reason.to_string(),
        });
        Ok(())
    }
}
