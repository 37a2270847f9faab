use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::SyncError;
use crate::snapshot::Snapshot;
use crate::snapshot_storage::SnapshotStorage;
use crate::types::CanonicalPath;

/// In-memory snapshot storage for testing and single-process deployments.
///
/// TTL expiry is lazy: an expired entry is dropped on the next access that
/// touches its key.
pub struct MemorySnapshotStorage {
    inner: Mutex<HashMap<CanonicalPath, StoredSnapshot>>,
}

struct StoredSnapshot {
    snapshot: Snapshot,
    expires_at: DateTime<Utc>,
}

impl MemorySnapshotStorage {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Number of live (unexpired) snapshots.
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.inner
            .lock()
            .values()
            .filter(|s| s.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemorySnapshotStorage {
    fn default() -> Self {
        Self::new()
    }
}

fn expiry(ttl: Duration) -> Result<DateTime<Utc>, SyncError> {
    let ttl = chrono::Duration::from_std(ttl).map_err(|e| SyncError::Persistence {
        reason: format!("snapshot TTL out of range: {ttl:?}"),
        source: Some(Box::new(e)),
    })?;
    Ok(Utc::now() + ttl)
}

#[async_trait]
impl SnapshotStorage for MemorySnapshotStorage {
    async fn load(&self, path: &CanonicalPath) -> Result<Option<Snapshot>, SyncError> {
        let mut inner = self.inner.lock();
        match inner.get(path) {
            Some(stored) if stored.expires_at > Utc::now() => Ok(Some(stored.snapshot.clone())),
            Some(_) => {
                inner.remove(path);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(
        &self,
        path: &CanonicalPath,
        snapshot: &Snapshot,
        ttl: Duration,
    ) -> Result<(), SyncError> {
        let expires_at = expiry(ttl)?;
        self.inner.lock().insert(
            path.clone(),
            StoredSnapshot {
                snapshot: snapshot.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, path: &CanonicalPath) -> Result<Option<Snapshot>, SyncError> {
        let mut inner = self.inner.lock();
        match inner.remove(path) {
            Some(stored) if stored.expires_at > Utc::now() => Ok(Some(stored.snapshot)),
            _ => Ok(None),
        }
    }
}
