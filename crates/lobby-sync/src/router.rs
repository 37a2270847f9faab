use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::config::SyncConfig;
use crate::envelope::{PatchMessage, RealtimeEnvelope};
use crate::error::SyncError;
use crate::types::CanonicalPath;

/// Channel types for real-time delivery to one connection.
pub type EnvelopeSender = mpsc::Sender<RealtimeEnvelope>;
pub type EnvelopeReceiver = mpsc::Receiver<RealtimeEnvelope>;

/// Opaque id of one live transport connection.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability the state store needs from the real-time side: deliver a
/// patch for one canonical path. Registered per type; the store never sees
/// connections or rooms.
#[async_trait]
pub trait FanoutHook: Send + Sync {
    async fn publish(&self, path: &CanonicalPath, message: PatchMessage);
}

/// Fanout hook that drops everything. For stores with no real-time side.
pub struct NoopFanout;

#[async_trait]
impl FanoutHook for NoopFanout {
    async fn publish(&self, _path: &CanonicalPath, _message: PatchMessage) {}
}

/// Maps live connections to the canonical paths they subscribed to and
/// delivers patches to exactly the subscribers registered on a path.
///
/// The registry lives behind one mutex and is the only shared mutable
/// state here. Delivery is fire-and-forget: a full or closed channel drops
/// the message for that subscriber, and closed connections are pruned on
/// the next publish. The router keeps no memory of a connection's
/// subscriptions after disconnect; a reconnecting client must resend every
/// subscribe it still cares about.
pub struct SubscriptionRouter {
    inner: Mutex<RouterInner>,
    next_connection: AtomicU64,
}

#[derive(Default)]
struct RouterInner {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<CanonicalPath, HashSet<ConnectionId>>,
}

struct Connection {
    sender: EnvelopeSender,
    paths: HashSet<CanonicalPath>,
}

impl SubscriptionRouter {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RouterInner::default()),
            next_connection: AtomicU64::new(1),
        }
    }

    /// Register a connection, allocating its outbound channel at the
    /// configured subscriber buffer size. The transport drains the
    /// returned receiver.
    pub fn open_connection(&self, config: &SyncConfig) -> (ConnectionId, EnvelopeReceiver) {
        let (sender, receiver) = mpsc::channel(config.subscriber_buffer);
        (self.connect(sender), receiver)
    }

    /// Register a transport connection, handing over its outbound channel.
    pub fn connect(&self, sender: EnvelopeSender) -> ConnectionId {
        let id = ConnectionId(self.next_connection.fetch_add(1, Ordering::Relaxed));
        self.inner.lock().connections.insert(
            id,
            Connection {
                sender,
                paths: HashSet::new(),
            },
        );
        tracing::debug!(connection = %id, "connection registered");
        id
    }

    /// Drop a connection and every subscription it held. Idempotent;
    /// transports call this on disconnect.
    pub fn disconnect(&self, connection: ConnectionId) {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.remove(&connection) else {
            return;
        };
        for path in &entry.paths {
            if let Some(room) = inner.rooms.get_mut(path) {
                room.remove(&connection);
                if room.is_empty() {
                    inner.rooms.remove(path);
                }
            }
        }
        tracing::debug!(connection = %connection, "connection removed");
    }

    /// Subscribe a connection to one concrete identity's canonical path.
    /// Duplicate subscribes from the same connection are idempotent.
    pub fn subscribe(
        &self,
        connection: ConnectionId,
        path: CanonicalPath,
    ) -> Result<(), SyncError> {
        let mut inner = self.inner.lock();
        let RouterInner { connections, rooms } = &mut *inner;
        let entry = connections
            .get_mut(&connection)
            .ok_or_else(|| SyncError::bad_request(format!("unknown connection {connection}")))?;
        if entry.paths.insert(path.clone()) {
            rooms.entry(path.clone()).or_default().insert(connection);
            tracing::debug!(connection = %connection, path = %path, "subscribed");
        }
        Ok(())
    }

    /// Explicitly drop one subscription while the connection stays open.
    /// Unsubscribing from a path that was never subscribed is a no-op.
    pub fn unsubscribe(&self, connection: ConnectionId, path: &CanonicalPath) {
        let mut inner = self.inner.lock();
        let RouterInner { connections, rooms } = &mut *inner;
        let Some(entry) = connections.get_mut(&connection) else {
            return;
        };
        if entry.paths.remove(path) {
            if let Some(room) = rooms.get_mut(path) {
                room.remove(&connection);
                if room.is_empty() {
                    rooms.remove(path);
                }
            }
            tracing::debug!(connection = %connection, path = %path, "unsubscribed");
        }
    }

    /// Subscribers currently registered on `path`.
    pub fn subscriber_count(&self, path: &CanonicalPath) -> usize {
        self.inner
            .lock()
            .rooms
            .get(path)
            .map(HashSet::len)
            .unwrap_or(0)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }
}

impl Default for SubscriptionRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FanoutHook for SubscriptionRouter {
    async fn publish(&self, path: &CanonicalPath, message: PatchMessage) {
        // Snapshot the room under the lock, send outside it.
        let targets: Vec<(ConnectionId, EnvelopeSender)> = {
            let inner = self.inner.lock();
            let Some(room) = inner.rooms.get(path) else {
                return;
            };
            room.iter()
                .filter_map(|id| {
                    inner
                        .connections
                        .get(id)
                        .map(|c| (*id, c.sender.clone()))
                })
                .collect()
        };

        let mut closed = Vec::new();
        for (id, sender) in targets {
            match sender.try_send(RealtimeEnvelope::Patch(message.clone())) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    // No backpressure: a slow subscriber just loses this one.
                    tracing::debug!(connection = %id, path = %path, "subscriber channel full, dropping patch");
                }
                Err(TrySendError::Closed(_)) => {
                    closed.push(id);
                }
            }
        }
        for id in closed {
            self.disconnect(id);
        }
    }
}
