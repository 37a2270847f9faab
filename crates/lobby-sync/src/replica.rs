use std::collections::HashMap;

use serde_json::Value;

use crate::patch::{self, PatchEnvelope};
use crate::types::CanonicalPath;

/// Result of feeding one incoming patch to a [`ReplicaCache`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Patch applied cleanly; the cached value is current again.
    Applied,
    /// A null patch removed the resource from the cache.
    Removed,
    /// The patch's `oldModifiedAtMs` does not match the cached stamp — a
    /// prior patch was missed. The patch was discarded; the caller must
    /// re-fetch the full snapshot and [`insert_full`] it.
    ///
    /// [`insert_full`]: ReplicaCache::insert_full
    Stale,
}

/// Client-side cache of wire-form snapshots, kept current by the patch
/// stream.
///
/// Implements the receiver half of the optimistic staleness check: every
/// incoming patch's `oldModifiedAtMs` is compared against the cached
/// `modifiedAtMs` before it is applied. Real-time delivery has no ordering
/// guarantee, so a mismatch is normal operation, not an error.
#[derive(Debug, Default)]
pub struct ReplicaCache {
    snapshots: HashMap<CanonicalPath, CachedSnapshot>,
}

#[derive(Debug)]
struct CachedSnapshot {
    value: Value,
    modified_at_ms: i64,
}

impl ReplicaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed or overwrite a path from a full re-fetch. The wire snapshot's
    /// own `modifiedAtMs` becomes the staleness baseline.
    pub fn insert_full(&mut self, path: CanonicalPath, wire: Value) {
        let modified_at_ms = stamp_of(&wire);
        self.snapshots.insert(
            path,
            CachedSnapshot {
                value: wire,
                modified_at_ms,
            },
        );
    }

    pub fn get(&self, path: &CanonicalPath) -> Option<&Value> {
        self.snapshots.get(path).map(|c| &c.value)
    }

    pub fn modified_at_ms(&self, path: &CanonicalPath) -> Option<i64> {
        self.snapshots.get(path).map(|c| c.modified_at_ms)
    }

    /// Feed one incoming patch envelope for `path`.
    pub fn apply(&mut self, path: &CanonicalPath, envelope: &PatchEnvelope) -> ApplyOutcome {
        if envelope.patch.is_null() {
            self.snapshots.remove(path);
            return ApplyOutcome::Removed;
        }

        match (envelope.old_modified_at_ms, self.snapshots.get(path)) {
            // Brand-new resource: build from nothing.
            (None, _) => {
                let value = patch::apply(&Value::Null, &envelope.patch);
                let modified_at_ms = stamp_of(&value);
                self.snapshots.insert(
                    path.clone(),
                    CachedSnapshot {
                        value,
                        modified_at_ms,
                    },
                );
                ApplyOutcome::Applied
            }
            // Patch against a snapshot this cache never had, or one it
            // remembers at a different stamp: either way a patch was
            // missed somewhere.
            (Some(_), None) => ApplyOutcome::Stale,
            (Some(old), Some(cached)) if cached.modified_at_ms != old => ApplyOutcome::Stale,
            (Some(_), Some(cached)) => {
                let value = patch::apply(&cached.value, &envelope.patch);
                let modified_at_ms = stamp_of(&value);
                self.snapshots.insert(
                    path.clone(),
                    CachedSnapshot {
                        value,
                        modified_at_ms,
                    },
                );
                ApplyOutcome::Applied
            }
        }
    }
}

fn stamp_of(wire: &Value) -> i64 {
    wire.get("modifiedAtMs").and_then(Value::as_i64).unwrap_or(0)
}
