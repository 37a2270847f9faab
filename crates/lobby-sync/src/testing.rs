//! In-memory engine fixture for unit and integration testing.
//!
//! Wires a [`StateStore`] to memory-backed snapshot storage, change log,
//! dead-letter sink, and a live [`SubscriptionRouter`], with no external
//! dependencies.

use std::sync::Arc;

use serde_json::json;

use crate::config::SyncConfig;
use crate::consumer::{BatchProcessor, LogConsumer};
use crate::descriptor::ResourceDescriptor;
use crate::log_storage::{ChangeLogStorage, DeadLetterSink};
use crate::router::{FanoutHook, SubscriptionRouter};
use crate::snapshot_storage::SnapshotStorage;
use crate::storage::memory_dead_letter::MemoryDeadLetterSink;
use crate::storage::memory_log::MemoryChangeLogStorage;
use crate::storage::memory_snapshot::MemorySnapshotStorage;
use crate::store::StateStore;

/// The lobby's own session type, as a ready-made fixture: `sessionId` is
/// the single identity key and the server-generated creation key.
pub fn session_descriptor() -> ResourceDescriptor {
    ResourceDescriptor::builder("session")
        .id_key("sessionId")
        .creation_key("sessionId")
        .field("participants", json!({}))
        .field("phase", json!("open"))
        .field("board", json!(null))
        .build()
        .expect("session descriptor is valid")
}

/// A memory-backed engine for one resource type.
pub struct TestEngine {
    pub descriptor: Arc<ResourceDescriptor>,
    pub snapshots: Arc<MemorySnapshotStorage>,
    pub log: Arc<MemoryChangeLogStorage>,
    pub dead_letters: Arc<MemoryDeadLetterSink>,
    pub router: Arc<SubscriptionRouter>,
    pub store: StateStore,
    config: SyncConfig,
}

impl TestEngine {
    /// Engine for the session fixture. The blocking-poll timeout is
    /// shortened so empty polls return promptly in tests.
    pub fn session() -> Self {
        let config = SyncConfig {
            log_read_timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        };
        Self::new(session_descriptor(), config)
    }

    pub fn new(descriptor: ResourceDescriptor, config: SyncConfig) -> Self {
        let descriptor = Arc::new(descriptor);
        let snapshots = Arc::new(MemorySnapshotStorage::new());
        let log = Arc::new(MemoryChangeLogStorage::new());
        let dead_letters = Arc::new(MemoryDeadLetterSink::new());
        let router = Arc::new(SubscriptionRouter::new());
        let store = StateStore::new(
            Arc::clone(&descriptor),
            Arc::clone(&snapshots) as Arc<dyn SnapshotStorage>,
            Arc::clone(&log) as Arc<dyn ChangeLogStorage>,
            Arc::clone(&router) as Arc<dyn FanoutHook>,
            config.clone(),
        )
        .expect("test engine config is valid");
        Self {
            descriptor,
            snapshots,
            log,
            dead_letters,
            router,
            store,
            config,
        }
    }

    /// A consumer for this engine's per-type topic.
    pub fn consumer(&self, group: &str, processor: Arc<dyn BatchProcessor>) -> LogConsumer {
        LogConsumer::new(
            Arc::clone(&self.log) as Arc<dyn ChangeLogStorage>,
            Arc::clone(&self.dead_letters) as Arc<dyn DeadLetterSink>,
            processor,
            self.descriptor.log_topic(),
            group,
            &self.config,
        )
    }
}
