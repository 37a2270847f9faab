use std::sync::Arc;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::config::SyncConfig;
use crate::descriptor::ResourceDescriptor;
use crate::envelope::PatchMessage;
use crate::error::SyncError;
use crate::id::{default_generator, IdGenerator};
use crate::log_storage::ChangeLogStorage;
use crate::patch::{self, PatchEnvelope};
use crate::router::FanoutHook;
use crate::snapshot::{ChangeRecord, Snapshot, SnapshotRef};
use crate::snapshot_storage::SnapshotStorage;
use crate::types::Identity;

/// What a patch entry point returns: enough for the caller to stamp its
/// own cache without re-reading.
#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub identity: Identity,
    pub modified_at_ms: i64,
}

/// Authoritative store for one resource type.
///
/// Owns the persisted snapshot per identity and, on every accepted
/// mutation, performs three actions concurrently and independently:
/// persist with a bounded TTL, append a change record to the per-type log,
/// and invoke the fanout hook. These are not transactional. A persistence
/// or log failure fails the call, but whatever did land is never rolled
/// back — the persisted snapshot stays authoritative and the log/fanout
/// are best-effort side channels. Fanout delivery is infallible
/// fire-and-forget.
///
/// There is no store-level locking across callers: every mutation is
/// computed from a freshly re-read previous snapshot and overwrites
/// whole snapshots, so a race between different callers loses an update
/// but never corrupts one. Callers racing on the same identity own their
/// re-read-then-write discipline.
pub struct StateStore {
    descriptor: Arc<ResourceDescriptor>,
    snapshots: Arc<dyn SnapshotStorage>,
    log: Arc<dyn ChangeLogStorage>,
    fanout: Arc<dyn FanoutHook>,
    config: SyncConfig,
}

impl StateStore {
    pub fn new(
        descriptor: Arc<ResourceDescriptor>,
        snapshots: Arc<dyn SnapshotStorage>,
        log: Arc<dyn ChangeLogStorage>,
        fanout: Arc<dyn FanoutHook>,
        config: SyncConfig,
    ) -> Result<Self, SyncError> {
        config.validate()?;
        Ok(Self {
            descriptor,
            snapshots,
            log,
            fanout,
            config,
        })
    }

    pub fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    /// Look up a snapshot; absence is not an error.
    pub async fn try_get(&self, identity: &Identity) -> Result<Option<Snapshot>, SyncError> {
        let path = self.descriptor.canonical_path(identity)?;
        let Some(snapshot) = self.snapshots.load(&path).await? else {
            return Ok(None);
        };
        // The snapshot's own embedded identity must match what was asked
        // for; a mismatch means cross-identity key confusion somewhere.
        if snapshot.identity != *identity
            || snapshot.resource_type != *self.descriptor.resource_type()
        {
            return Err(SyncError::Forbidden { path });
        }
        Ok(Some(snapshot))
    }

    /// Look up a snapshot; absence is `NotFound`.
    pub async fn get(&self, identity: &Identity) -> Result<Snapshot, SyncError> {
        match self.try_get(identity).await? {
            Some(snapshot) => Ok(snapshot),
            None => Err(SyncError::NotFound {
                path: self.descriptor.canonical_path(identity)?,
            }),
        }
    }

    /// Create a resource, generating the creation-key value server-side.
    ///
    /// `partial_identity` carries every identity key except the creation
    /// key. The generator is retried a bounded number of times if it
    /// produces a taken identity.
    pub async fn post(
        &self,
        partial_identity: &Identity,
        body: &Map<String, Value>,
        generator: Option<IdGenerator>,
    ) -> Result<Snapshot, SyncError> {
        let creation_key = self.descriptor.creation_key().ok_or_else(|| {
            SyncError::bad_request(format!(
                "type '{}' has no creation key; post is not supported",
                self.descriptor.resource_type()
            ))
        })?;
        if partial_identity.contains_key(creation_key) {
            return Err(SyncError::bad_request(format!(
                "creation key '{creation_key}' is server-generated and must not be supplied"
            )));
        }
        let generator =
            generator.unwrap_or_else(|| default_generator(self.config.creation_token_len));
        let body = self.descriptor.synthesize_body(body)?;

        for _ in 0..self.config.creation_max_attempts {
            let mut identity = partial_identity.clone();
            identity.insert(creation_key.to_string(), generator());
            // Raises BadRequest before any side effect if the partial
            // identity was malformed.
            self.descriptor.validate_identity(&identity)?;
            if self.try_get(&identity).await?.is_some() {
                continue;
            }
            let now = now_ms();
            let snapshot = Snapshot {
                resource_type: self.descriptor.resource_type().clone(),
                identity,
                created_at_ms: now,
                modified_at_ms: now,
                is_deleted: false,
                body: body.clone(),
            };
            self.commit(None, &snapshot).await?;
            return Ok(snapshot);
        }
        Err(SyncError::persistence(format!(
            "could not generate an unused '{creation_key}' in {} attempts",
            self.config.creation_max_attempts
        )))
    }

    /// Full body replace. Replacing with a deep-equal body is a no-op:
    /// the existing snapshot comes back unchanged, nothing is emitted and
    /// `modified_at_ms` is untouched.
    pub async fn put(
        &self,
        identity: &Identity,
        body: &Map<String, Value>,
    ) -> Result<Snapshot, SyncError> {
        let body = self.descriptor.synthesize_body(body)?;
        let existing = self.get(identity).await?;
        self.guard_not_deleted(&existing)?;
        if existing.body == body {
            return Ok(existing);
        }
        let new = Snapshot {
            modified_at_ms: stamp(&existing),
            body,
            ..existing.clone()
        };
        self.commit(Some(&existing), &new).await?;
        Ok(new)
    }

    /// Patch a resource that must already exist; fails `NotFound` otherwise.
    pub async fn patch_existing(
        &self,
        identity: &Identity,
        partial: &Map<String, Value>,
    ) -> Result<PatchOutcome, SyncError> {
        let previous = self.get(identity).await?;
        self.apply_patch(identity, partial, Some(previous)).await
    }

    /// Patch, creating the resource if it does not exist. An absent
    /// previous snapshot behaves as a create-via-patch: defaults plus the
    /// supplied fields.
    pub async fn patch_or_create(
        &self,
        identity: &Identity,
        partial: &Map<String, Value>,
    ) -> Result<PatchOutcome, SyncError> {
        let previous = self.try_get(identity).await?;
        self.apply_patch(identity, partial, previous).await
    }

    /// Patch only if the resource exists; silently no-ops otherwise.
    pub async fn patch_if_exists(
        &self,
        identity: &Identity,
        partial: &Map<String, Value>,
    ) -> Result<Option<PatchOutcome>, SyncError> {
        match self.try_get(identity).await? {
            None => Ok(None),
            Some(previous) => Ok(Some(
                self.apply_patch(identity, partial, Some(previous)).await?,
            )),
        }
    }

    /// Re-stamp `modified_at_ms` without changing the body — signals
    /// "something dependent changed" to polling and subscribing clients.
    pub async fn touch(&self, identity: &Identity) -> Result<Snapshot, SyncError> {
        let existing = self.get(identity).await?;
        self.guard_not_deleted(&existing)?;
        let new = Snapshot {
            modified_at_ms: stamp(&existing),
            ..existing.clone()
        };
        self.commit(Some(&existing), &new).await?;
        Ok(new)
    }

    /// Soft-delete: mark `is_deleted` without removing the persisted
    /// value. Further put/patch/touch are rejected until the resource is
    /// hard-deleted (or a new identity is posted). Marking an
    /// already-deleted resource is a no-op.
    pub async fn mark_deleted(&self, identity: &Identity) -> Result<Snapshot, SyncError> {
        let existing = self.get(identity).await?;
        if existing.is_deleted {
            return Ok(existing);
        }
        let new = Snapshot {
            modified_at_ms: stamp(&existing),
            is_deleted: true,
            ..existing.clone()
        };
        self.commit(Some(&existing), &new).await?;
        Ok(new)
    }

    /// Hard delete: remove the persisted value outright, independent of
    /// the soft-delete flag. No-op if nothing is persisted.
    pub async fn delete(&self, identity: &Identity) -> Result<Option<Snapshot>, SyncError> {
        let path = self.descriptor.canonical_path(identity)?;
        let Some(previous) = self.snapshots.remove(&path).await? else {
            return Ok(None);
        };
        let record = ChangeRecord::delete(self.reference(&previous), previous.clone());
        let message = PatchMessage {
            reference: self.reference(&previous),
            patch: PatchEnvelope {
                patch: Value::Null,
                old_modified_at_ms: Some(previous.modified_at_ms),
            },
        };
        let topic = self.descriptor.log_topic();
        let (append, ()) = tokio::join!(
            self.log.append(&topic, record),
            self.fanout.publish(&path, message),
        );
        if let Err(err) = append {
            tracing::warn!(path = %path, error = %err, "change-log append failed after delete");
            return Err(err);
        }
        Ok(Some(previous))
    }

    /// Trim change-log entries older than the configured retention
    /// window. Meant to be scheduled periodically by the hosting service;
    /// returns how many entries were dropped.
    pub async fn trim_log(&self) -> Result<usize, SyncError> {
        self.log
            .trim(&self.descriptor.log_topic(), self.config.log_retention)
            .await
    }

    fn reference(&self, snapshot: &Snapshot) -> SnapshotRef {
        SnapshotRef {
            resource_type: snapshot.resource_type.clone(),
            identity: snapshot.identity.clone(),
        }
    }

    fn guard_not_deleted(&self, snapshot: &Snapshot) -> Result<(), SyncError> {
        if snapshot.is_deleted {
            return Err(SyncError::Deleted {
                path: self.descriptor.canonical_path(&snapshot.identity)?,
            });
        }
        Ok(())
    }

    /// Shallow-merge `partial` over the previous body, or create from
    /// defaults when there is no previous snapshot. A merge that changes
    /// nothing is a no-op that reports the unchanged `modified_at_ms`.
    async fn apply_patch(
        &self,
        identity: &Identity,
        partial: &Map<String, Value>,
        previous: Option<Snapshot>,
    ) -> Result<PatchOutcome, SyncError> {
        match previous {
            Some(previous) => {
                self.guard_not_deleted(&previous)?;
                let mut body = previous.body.clone();
                for (field, value) in partial {
                    if !self.descriptor.defaults().contains_key(field) {
                        return Err(SyncError::bad_request(format!(
                            "unknown body field '{field}' for type '{}'",
                            self.descriptor.resource_type()
                        )));
                    }
                    body.insert(field.clone(), value.clone());
                }
                if body == previous.body {
                    return Ok(PatchOutcome {
                        identity: identity.clone(),
                        modified_at_ms: previous.modified_at_ms,
                    });
                }
                let new = Snapshot {
                    modified_at_ms: stamp(&previous),
                    body,
                    ..previous.clone()
                };
                self.commit(Some(&previous), &new).await?;
                Ok(PatchOutcome {
                    identity: identity.clone(),
                    modified_at_ms: new.modified_at_ms,
                })
            }
            None => {
                let body = self.descriptor.synthesize_body(partial)?;
                self.descriptor.validate_identity(identity)?;
                let now = now_ms();
                let snapshot = Snapshot {
                    resource_type: self.descriptor.resource_type().clone(),
                    identity: identity.clone(),
                    created_at_ms: now,
                    modified_at_ms: now,
                    is_deleted: false,
                    body,
                };
                self.commit(None, &snapshot).await?;
                Ok(PatchOutcome {
                    identity: identity.clone(),
                    modified_at_ms: now,
                })
            }
        }
    }

    /// The triple side effect for creates and updates. Called only once a
    /// real change is known to have occurred.
    async fn commit(
        &self,
        previous: Option<&Snapshot>,
        new: &Snapshot,
    ) -> Result<(), SyncError> {
        let path = self.descriptor.canonical_path(&new.identity)?;

        let record = match previous {
            None => ChangeRecord::create(self.reference(new), new.clone()),
            Some(old) => ChangeRecord::update(self.reference(new), old.clone(), new.clone()),
        };

        // Patches are diffed over the full (unminified) wire forms so a
        // field crossing its default value still diffs correctly.
        let new_wire = new.to_wire(&self.descriptor, false)?;
        let patch = match previous {
            None => new_wire,
            Some(old) => {
                let old_wire = old.to_wire(&self.descriptor, false)?;
                patch::generate(&old_wire, &new_wire).unwrap_or(Value::Object(Map::new()))
            }
        };
        let message = PatchMessage {
            reference: self.reference(new),
            patch: PatchEnvelope {
                patch,
                old_modified_at_ms: previous.map(|p| p.modified_at_ms),
            },
        };

        let topic = self.descriptor.log_topic();
        let (persist, append, ()) = tokio::join!(
            self.snapshots.save(&path, new, self.config.snapshot_ttl),
            self.log.append(&topic, record),
            self.fanout.publish(&path, message),
        );
        persist?;
        if let Err(err) = append {
            tracing::warn!(path = %path, error = %err, "change-log append failed; persisted snapshot stands");
            return Err(err);
        }
        Ok(())
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Next `modified_at_ms` for an accepted mutation: wall clock, but always
/// strictly greater than the previous stamp.
fn stamp(previous: &Snapshot) -> i64 {
    now_ms().max(previous.modified_at_ms + 1)
}
