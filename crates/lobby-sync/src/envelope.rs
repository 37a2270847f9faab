use serde::{Deserialize, Serialize};

use crate::patch::PatchEnvelope;
use crate::snapshot::SnapshotRef;
use crate::types::CanonicalPath;

/// Tagged envelope for messages on the real-time wire:
/// `{type: "subscribe"|"unsubscribe"|"patch"|"ping"|"pong", payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum RealtimeEnvelope {
    /// Client registers interest in one concrete identity by canonical path.
    Subscribe(SubscriptionRequest),
    /// Client drops interest while the connection stays open.
    Unsubscribe(SubscriptionRequest),
    /// Server pushes a patch to subscribers of the path.
    Patch(PatchMessage),
    Ping,
    Pong,
}

/// Payload of subscribe/unsubscribe. Always one concrete identity — there
/// is no type-level wildcard subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub path: CanonicalPath,
}

/// What a subscriber receives on every mutation of its resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMessage {
    #[serde(rename = "ref")]
    pub reference: SnapshotRef,
    #[serde(flatten)]
    pub patch: PatchEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Identity, ResourceType};
    use serde_json::json;

    #[test]
    fn subscribe_wire_shape() {
        let envelope = RealtimeEnvelope::Subscribe(SubscriptionRequest {
            path: CanonicalPath::new("/sessionId/ABC123/session"),
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            value,
            json!({"type": "subscribe", "payload": {"path": "/sessionId/ABC123/session"}})
        );
        let back: RealtimeEnvelope = serde_json::from_value(value).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn patch_wire_shape_flattens_envelope() {
        let envelope = RealtimeEnvelope::Patch(PatchMessage {
            reference: SnapshotRef {
                resource_type: ResourceType::new("session"),
                identity: Identity::new().with("sessionId", "ABC123"),
            },
            patch: PatchEnvelope {
                patch: json!({"phase": "playing"}),
                old_modified_at_ms: Some(77),
            },
        });
        let value = serde_json::to_value(&envelope).unwrap();
        assert_eq!(value["type"], json!("patch"));
        assert_eq!(
            value["payload"],
            json!({
                "ref": {"type": "session", "sessionId": "ABC123"},
                "patch": {"phase": "playing"},
                "oldModifiedAtMs": 77,
            })
        );
    }

    #[test]
    fn ping_pong_roundtrip() {
        for envelope in [RealtimeEnvelope::Ping, RealtimeEnvelope::Pong] {
            let value = serde_json::to_value(&envelope).unwrap();
            let back: RealtimeEnvelope = serde_json::from_value(value).unwrap();
            assert_eq!(back, envelope);
        }
    }
}
