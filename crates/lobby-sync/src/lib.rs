//! Resource state-synchronization engine for the lobby services.
//!
//! Stores the authoritative value of typed, identity-addressed resources,
//! detects meaningful changes, and propagates minimal patches to
//! concurrently connected real-time subscribers, while a per-type change
//! log feeds derived projections through independent consumer groups.
//!
//! The HTTP layer, authentication, game rules and UI are external
//! collaborators: they call [`store::StateStore`] operations and speak the
//! wire shapes in [`envelope`], [`snapshot`] and [`patch`].

pub mod config;
pub mod consumer;
pub mod descriptor;
pub mod envelope;
pub mod error;
pub mod id;
pub mod log_storage;
pub mod patch;
pub mod replica;
pub mod router;
pub mod snapshot;
pub mod snapshot_storage;
pub mod storage;
pub mod store;
pub mod testing;
pub mod types;

pub use config::SyncConfig;
pub use descriptor::{DescriptorBuilder, ResourceDescriptor};
pub use error::SyncError;
pub use snapshot::{ChangeRecord, Snapshot, SnapshotRef};
pub use store::{PatchOutcome, StateStore};
pub use types::{CanonicalPath, Identity, ResourceType};
