use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::descriptor::ResourceDescriptor;
use crate::error::SyncError;
use crate::types::{Identity, ResourceType};

/// Full current value of a resource instance at a point in time.
///
/// This is the in-process/persisted form. The flattened wire form
/// (`{type, ...identity, createdAtMs, modifiedAtMs, isDeleted?, ...body}`)
/// is produced by [`to_wire`], which needs the descriptor to know which
/// keys are identity and which are body.
///
/// [`to_wire`]: Snapshot::to_wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub identity: Identity,
    pub created_at_ms: i64,
    pub modified_at_ms: i64,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_deleted: bool,
    pub body: Map<String, Value>,
}

impl Snapshot {
    /// Body as a JSON object value, for diffing.
    pub fn body_value(&self) -> Value {
        Value::Object(self.body.clone())
    }

    /// Flattened wire form. With `minify`, body fields equal to their
    /// descriptor default are omitted; they are always present
    /// conceptually and restored by [`from_wire`].
    ///
    /// [`from_wire`]: Snapshot::from_wire
    pub fn to_wire(&self, descriptor: &ResourceDescriptor, minify: bool) -> Result<Value, SyncError> {
        descriptor.validate_identity(&self.identity)?;
        let mut out = Map::new();
        out.insert(
            "type".to_string(),
            Value::String(self.resource_type.0.clone()),
        );
        for key in descriptor.id_keys() {
            let value = self.identity.get(key).expect("validated above");
            out.insert(key.clone(), Value::String(value.to_string()));
        }
        out.insert("createdAtMs".to_string(), Value::from(self.created_at_ms));
        out.insert("modifiedAtMs".to_string(), Value::from(self.modified_at_ms));
        if self.is_deleted {
            out.insert("isDeleted".to_string(), Value::Bool(true));
        }
        for (field, value) in &self.body {
            if minify && descriptor.is_default(field, value) {
                continue;
            }
            out.insert(field.clone(), value.clone());
        }
        Ok(Value::Object(out))
    }

    /// Parse a flattened wire object back into a snapshot. Elided body
    /// fields come back at their synthesized defaults.
    pub fn from_wire(descriptor: &ResourceDescriptor, wire: &Value) -> Result<Self, SyncError> {
        let obj = wire
            .as_object()
            .ok_or_else(|| SyncError::bad_request("wire snapshot must be an object"))?;

        let type_tag = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SyncError::bad_request("wire snapshot missing 'type'"))?;
        if type_tag != descriptor.resource_type().as_ref() {
            return Err(SyncError::bad_request(format!(
                "wire snapshot has type '{type_tag}', expected '{}'",
                descriptor.resource_type()
            )));
        }

        let mut identity = Identity::new();
        for key in descriptor.id_keys() {
            let value = obj.get(key).and_then(Value::as_str).ok_or_else(|| {
                SyncError::bad_request(format!("wire snapshot missing identity key '{key}'"))
            })?;
            identity.insert(key.clone(), value.to_string());
        }

        let created_at_ms = obj
            .get("createdAtMs")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::bad_request("wire snapshot missing 'createdAtMs'"))?;
        let modified_at_ms = obj
            .get("modifiedAtMs")
            .and_then(Value::as_i64)
            .ok_or_else(|| SyncError::bad_request("wire snapshot missing 'modifiedAtMs'"))?;
        let is_deleted = obj
            .get("isDeleted")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let mut partial = Map::new();
        for (key, value) in obj {
            if key == "type" || key == "createdAtMs" || key == "modifiedAtMs" || key == "isDeleted"
            {
                continue;
            }
            if descriptor.id_keys().iter().any(|k| k == key) {
                continue;
            }
            partial.insert(key.clone(), value.clone());
        }
        let body = descriptor.synthesize_body(&partial)?;

        Ok(Snapshot {
            resource_type: descriptor.resource_type().clone(),
            identity,
            created_at_ms,
            modified_at_ms,
            is_deleted,
            body,
        })
    }
}

/// Type plus identity: enough to address one resource instance on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRef {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    #[serde(flatten)]
    pub identity: Identity,
}

/// Before/after pair emitted on a mutation.
///
/// `dto` absent means delete; `old_dto` absent means create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    #[serde(rename = "ref")]
    pub reference: SnapshotRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dto: Option<Snapshot>,
    #[serde(rename = "oldDto", default, skip_serializing_if = "Option::is_none")]
    pub old_dto: Option<Snapshot>,
}

impl ChangeRecord {
    pub fn create(reference: SnapshotRef, new: Snapshot) -> Self {
        Self {
            reference,
            dto: Some(new),
            old_dto: None,
        }
    }

    pub fn update(reference: SnapshotRef, old: Snapshot, new: Snapshot) -> Self {
        Self {
            reference,
            dto: Some(new),
            old_dto: Some(old),
        }
    }

    pub fn delete(reference: SnapshotRef, old: Snapshot) -> Self {
        Self {
            reference,
            dto: None,
            old_dto: Some(old),
        }
    }

    pub fn is_create(&self) -> bool {
        self.old_dto.is_none()
    }

    pub fn is_delete(&self) -> bool {
        self.dto.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceDescriptor;
    use serde_json::json;

    fn session_descriptor() -> ResourceDescriptor {
        ResourceDescriptor::builder("session")
            .id_key("sessionId")
            .creation_key("sessionId")
            .field("participants", json!({}))
            .field("phase", json!("open"))
            .build()
            .unwrap()
    }

    fn sample(descriptor: &ResourceDescriptor) -> Snapshot {
        Snapshot {
            resource_type: descriptor.resource_type().clone(),
            identity: Identity::new().with("sessionId", "ABC123"),
            created_at_ms: 1_000,
            modified_at_ms: 2_000,
            is_deleted: false,
            body: descriptor.defaults().clone(),
        }
    }

    #[test]
    fn wire_form_is_flattened() {
        let descriptor = session_descriptor();
        let mut snapshot = sample(&descriptor);
        snapshot
            .body
            .insert("phase".to_string(), json!("playing"));
        let wire = snapshot.to_wire(&descriptor, false).unwrap();
        assert_eq!(
            wire,
            json!({
                "type": "session",
                "sessionId": "ABC123",
                "createdAtMs": 1000,
                "modifiedAtMs": 2000,
                "participants": {},
                "phase": "playing",
            })
        );
    }

    #[test]
    fn minified_wire_elides_default_body_fields() {
        let descriptor = session_descriptor();
        let snapshot = sample(&descriptor);
        let wire = snapshot.to_wire(&descriptor, true).unwrap();
        let obj = wire.as_object().unwrap();
        assert!(!obj.contains_key("participants"));
        assert!(!obj.contains_key("phase"));

        // Restored at defaults on the way back in.
        let back = Snapshot::from_wire(&descriptor, &wire).unwrap();
        assert_eq!(back, snapshot);
    }

    #[test]
    fn is_deleted_only_present_when_true() {
        let descriptor = session_descriptor();
        let mut snapshot = sample(&descriptor);
        let wire = snapshot.to_wire(&descriptor, true).unwrap();
        assert!(!wire.as_object().unwrap().contains_key("isDeleted"));

        snapshot.is_deleted = true;
        let wire = snapshot.to_wire(&descriptor, true).unwrap();
        assert_eq!(wire.get("isDeleted"), Some(&json!(true)));
    }

    #[test]
    fn from_wire_rejects_wrong_type() {
        let descriptor = session_descriptor();
        let err = Snapshot::from_wire(
            &descriptor,
            &json!({"type": "player", "sessionId": "A", "createdAtMs": 1, "modifiedAtMs": 1}),
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn change_record_wire_field_names() {
        let descriptor = session_descriptor();
        let snapshot = sample(&descriptor);
        let record = ChangeRecord::update(
            SnapshotRef {
                resource_type: descriptor.resource_type().clone(),
                identity: snapshot.identity.clone(),
            },
            snapshot.clone(),
            snapshot,
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["ref"]["type"], json!("session"));
        assert_eq!(value["ref"]["sessionId"], json!("ABC123"));
        assert!(value.get("dto").is_some());
        assert!(value.get("oldDto").is_some());

        let back: ChangeRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn create_and_delete_markers() {
        let descriptor = session_descriptor();
        let snapshot = sample(&descriptor);
        let reference = SnapshotRef {
            resource_type: descriptor.resource_type().clone(),
            identity: snapshot.identity.clone(),
        };
        assert!(ChangeRecord::create(reference.clone(), snapshot.clone()).is_create());
        assert!(ChangeRecord::delete(reference, snapshot).is_delete());
    }
}
