use async_trait::async_trait;
use std::time::Duration;

use crate::error::SyncError;
use crate::snapshot::Snapshot;
use crate::types::CanonicalPath;

/// Key-value persistence for authoritative snapshots, keyed by canonical
/// path. Every save carries a TTL so abandoned resources self-expire.
///
/// The persisted snapshot is the authoritative value; the change log and
/// real-time fanout are best-effort side channels fed from the same
/// mutation.
#[async_trait]
pub trait SnapshotStorage: Send + Sync {
    /// Load the snapshot at `path`, or `None` if absent or expired.
    async fn load(&self, path: &CanonicalPath) -> Result<Option<Snapshot>, SyncError>;

    /// Persist `snapshot` at `path`, resetting its TTL.
    async fn save(
        &self,
        path: &CanonicalPath,
        snapshot: &Snapshot,
        ttl: Duration,
    ) -> Result<(), SyncError>;

    /// Remove the value at `path` outright, returning what was stored.
    /// Independent of the soft-delete flag.
    async fn remove(&self, path: &CanonicalPath) -> Result<Option<Snapshot>, SyncError>;
}
