use serde_json::{Map, Value};

use crate::error::SyncError;
use crate::types::{CanonicalPath, Identity, ResourceType};

/// Field names reserved by the snapshot envelope; body fields and identity
/// keys may not shadow them.
const RESERVED_FIELDS: &[&str] = &["type", "createdAtMs", "modifiedAtMs", "isDeleted"];

/// Static definition of a resource type.
///
/// Built once at process init and treated as an immutable data value:
/// the type tag, the identity-key order (significant — it fixes the
/// canonical path), the optional server-generated creation key, and the
/// body field set with defaults synthesized at build time. The schema has
/// no optional fields at the value level; every body field always has a
/// default.
#[derive(Debug, Clone)]
pub struct ResourceDescriptor {
    resource_type: ResourceType,
    id_keys: Vec<String>,
    creation_key: Option<String>,
    defaults: Map<String, Value>,
}

/// Builder for [`ResourceDescriptor`]. Validation happens in [`build`],
/// before the descriptor can reach any runtime logic.
///
/// [`build`]: DescriptorBuilder::build
#[derive(Debug, Default)]
pub struct DescriptorBuilder {
    resource_type: String,
    id_keys: Vec<String>,
    creation_key: Option<String>,
    defaults: Map<String, Value>,
}

impl ResourceDescriptor {
    pub fn builder(resource_type: impl Into<String>) -> DescriptorBuilder {
        DescriptorBuilder {
            resource_type: resource_type.into(),
            ..Default::default()
        }
    }

    pub fn resource_type(&self) -> &ResourceType {
        &self.resource_type
    }

    /// Identity keys in canonical order.
    pub fn id_keys(&self) -> &[String] {
        &self.id_keys
    }

    /// The identity key whose value the server generates on `post`, if any.
    pub fn creation_key(&self) -> Option<&str> {
        self.creation_key.as_deref()
    }

    /// Synthesized defaults for every body field.
    pub fn defaults(&self) -> &Map<String, Value> {
        &self.defaults
    }

    /// Whether `value` equals the synthesized default for `field`. Used to
    /// elide default-valued fields from the minified wire form.
    pub fn is_default(&self, field: &str, value: &Value) -> bool {
        self.defaults.get(field) == Some(value)
    }

    /// Log topic for this type. Topics are per-type, never per-instance.
    pub fn log_topic(&self) -> String {
        format!("changes/{}", self.resource_type)
    }

    /// Check that `identity` is an exact permutation of this descriptor's
    /// identity keys with path-safe values.
    pub fn validate_identity(&self, identity: &Identity) -> Result<(), SyncError> {
        for key in &self.id_keys {
            match identity.get(key) {
                None => {
                    return Err(SyncError::bad_request(format!(
                        "missing identity key '{key}' for type '{}'",
                        self.resource_type
                    )))
                }
                Some(value) => validate_path_segment(value)?,
            }
        }
        if identity.len() != self.id_keys.len() {
            let extra: Vec<&str> = identity
                .keys()
                .filter(|k| !self.id_keys.iter().any(|ik| ik == k))
                .collect();
            return Err(SyncError::bad_request(format!(
                "unknown identity keys {extra:?} for type '{}'",
                self.resource_type
            )));
        }
        Ok(())
    }

    /// Canonical path `/key1/val1/.../keyN/valN/type`, keys strictly in
    /// declared order. Doubles as persistence-key suffix and room id.
    pub fn canonical_path(&self, identity: &Identity) -> Result<CanonicalPath, SyncError> {
        self.validate_identity(identity)?;
        let mut path = String::new();
        for key in &self.id_keys {
            let value = identity.get(key).expect("validated above");
            path.push('/');
            path.push_str(key);
            path.push('/');
            path.push_str(value);
        }
        path.push('/');
        path.push_str(self.resource_type.as_ref());
        Ok(CanonicalPath(path))
    }

    /// Inverse of [`canonical_path`]: `parse_path(canonical_path(ids)) == ids`
    /// for any valid identity.
    ///
    /// [`canonical_path`]: ResourceDescriptor::canonical_path
    pub fn parse_path(&self, path: &str) -> Result<Identity, SyncError> {
        let stripped = path.strip_prefix('/').ok_or_else(|| {
            SyncError::bad_request(format!("canonical path must start with '/': {path}"))
        })?;
        let segments: Vec<&str> = stripped.split('/').collect();
        if segments.len() != self.id_keys.len() * 2 + 1 {
            return Err(SyncError::bad_request(format!(
                "canonical path has {} segments, expected {} for type '{}'",
                segments.len(),
                self.id_keys.len() * 2 + 1,
                self.resource_type
            )));
        }
        let tail = segments[segments.len() - 1];
        if tail != self.resource_type.as_ref() {
            return Err(SyncError::bad_request(format!(
                "canonical path names type '{tail}', expected '{}'",
                self.resource_type
            )));
        }
        let mut identity = Identity::new();
        for (i, key) in self.id_keys.iter().enumerate() {
            let seg_key = segments[i * 2];
            let seg_val = segments[i * 2 + 1];
            if seg_key != key {
                return Err(SyncError::bad_request(format!(
                    "canonical path key '{seg_key}' at position {i}, expected '{key}'"
                )));
            }
            validate_path_segment(seg_val)?;
            identity.insert(key.clone(), seg_val.to_string());
        }
        Ok(identity)
    }

    /// Overlay `partial` on the synthesized defaults, producing a complete
    /// body. Unknown fields are rejected before any side effect.
    pub fn synthesize_body(&self, partial: &Map<String, Value>) -> Result<Map<String, Value>, SyncError> {
        let mut body = self.defaults.clone();
        for (key, value) in partial {
            if !self.defaults.contains_key(key) {
                return Err(SyncError::bad_request(format!(
                    "unknown body field '{key}' for type '{}'",
                    self.resource_type
                )));
            }
            body.insert(key.clone(), value.clone());
        }
        Ok(body)
    }
}

impl DescriptorBuilder {
    /// Append an identity key. Order of calls fixes the canonical order.
    pub fn id_key(mut self, key: impl Into<String>) -> Self {
        self.id_keys.push(key.into());
        self
    }

    /// Mark one identity key as server-generated on `post`.
    pub fn creation_key(mut self, key: impl Into<String>) -> Self {
        self.creation_key = Some(key.into());
        self
    }

    /// Declare a body field with its default value.
    pub fn field(mut self, name: impl Into<String>, default: Value) -> Self {
        self.defaults.insert(name.into(), default);
        self
    }

    pub fn build(self) -> Result<ResourceDescriptor, SyncError> {
        if self.resource_type.is_empty() {
            return Err(SyncError::bad_request(
                "resource type must be non-empty (empty string is the reserved base type)",
            ));
        }
        validate_path_segment(&self.resource_type)?;
        for (i, key) in self.id_keys.iter().enumerate() {
            if key.is_empty() {
                return Err(SyncError::bad_request("identity key must be non-empty"));
            }
            validate_path_segment(key)?;
            if self.id_keys[..i].contains(key) {
                return Err(SyncError::bad_request(format!(
                    "duplicate identity key '{key}'"
                )));
            }
            if RESERVED_FIELDS.contains(&key.as_str()) {
                return Err(SyncError::bad_request(format!(
                    "identity key '{key}' shadows a reserved snapshot field"
                )));
            }
        }
        if let Some(creation) = &self.creation_key {
            if !self.id_keys.contains(creation) {
                return Err(SyncError::bad_request(format!(
                    "creation key '{creation}' is not an identity key"
                )));
            }
        }
        for field in self.defaults.keys() {
            if RESERVED_FIELDS.contains(&field.as_str()) || self.id_keys.contains(field) {
                return Err(SyncError::bad_request(format!(
                    "body field '{field}' collides with a reserved or identity field"
                )));
            }
        }
        Ok(ResourceDescriptor {
            resource_type: ResourceType::new(self.resource_type),
            id_keys: self.id_keys,
            creation_key: self.creation_key,
            defaults: self.defaults,
        })
    }
}

/// Path segments must be path-safe ASCII: printable, no '/', non-empty.
fn validate_path_segment(value: &str) -> Result<(), SyncError> {
    if value.is_empty() {
        return Err(SyncError::bad_request("path segment must be non-empty"));
    }
    if !value.chars().all(|c| c.is_ascii_graphic() && c != '/') {
        return Err(SyncError::bad_request(format!(
            "path segment '{value}' contains non-path-safe characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session() -> ResourceDescriptor {
        ResourceDescriptor::builder("session")
            .id_key("sessionId")
            .creation_key("sessionId")
            .field("participants", json!({}))
            .field("phase", json!("open"))
            .build()
            .unwrap()
    }

    #[test]
    fn canonical_path_follows_declared_key_order() {
        let descriptor = ResourceDescriptor::builder("seat")
            .id_key("sessionId")
            .id_key("playerId")
            .build()
            .unwrap();
        let identity = Identity::new()
            .with("playerId", "p9")
            .with("sessionId", "ABC123");
        let path = descriptor.canonical_path(&identity).unwrap();
        assert_eq!(path.as_ref(), "/sessionId/ABC123/playerId/p9/seat");
    }

    #[test]
    fn parse_inverts_stringify() {
        let descriptor = ResourceDescriptor::builder("seat")
            .id_key("sessionId")
            .id_key("playerId")
            .build()
            .unwrap();
        let identity = Identity::new()
            .with("sessionId", "ABC123")
            .with("playerId", "p9");
        let path = descriptor.canonical_path(&identity).unwrap();
        let parsed = descriptor.parse_path(path.as_ref()).unwrap();
        assert_eq!(parsed, identity);
    }

    #[test]
    fn missing_identity_key_is_bad_request() {
        let err = session()
            .canonical_path(&Identity::new())
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn extra_identity_key_is_bad_request() {
        let identity = Identity::new()
            .with("sessionId", "ABC123")
            .with("bogus", "x");
        let err = session().canonical_path(&identity).unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn non_path_safe_value_rejected() {
        let identity = Identity::new().with("sessionId", "a/b");
        assert!(session().canonical_path(&identity).is_err());
        let identity = Identity::new().with("sessionId", "");
        assert!(session().canonical_path(&identity).is_err());
    }

    #[test]
    fn parse_rejects_wrong_type_tail() {
        let err = session().parse_path("/sessionId/ABC123/player").unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn parse_rejects_wrong_key_order() {
        let descriptor = ResourceDescriptor::builder("seat")
            .id_key("sessionId")
            .id_key("playerId")
            .build()
            .unwrap();
        let err = descriptor
            .parse_path("/playerId/p9/sessionId/ABC123/seat")
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn build_rejects_empty_type() {
        assert!(ResourceDescriptor::builder("").build().is_err());
    }

    #[test]
    fn build_rejects_duplicate_id_keys() {
        let err = ResourceDescriptor::builder("seat")
            .id_key("sessionId")
            .id_key("sessionId")
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn build_rejects_creation_key_outside_identity() {
        let err = ResourceDescriptor::builder("session")
            .id_key("sessionId")
            .creation_key("playerId")
            .build()
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn build_rejects_reserved_field_collisions() {
        assert!(ResourceDescriptor::builder("session")
            .id_key("sessionId")
            .field("modifiedAtMs", json!(0))
            .build()
            .is_err());
        assert!(ResourceDescriptor::builder("session")
            .id_key("type")
            .build()
            .is_err());
    }

    #[test]
    fn synthesize_fills_defaults_and_rejects_unknown() {
        let descriptor = session();
        let body = descriptor
            .synthesize_body(&Map::from_iter([(
                "phase".to_string(),
                json!("playing"),
            )]))
            .unwrap();
        assert_eq!(body.get("phase"), Some(&json!("playing")));
        assert_eq!(body.get("participants"), Some(&json!({})));

        let err = descriptor
            .synthesize_body(&Map::from_iter([("bogus".to_string(), json!(1))]))
            .unwrap_err();
        assert!(matches!(err, SyncError::BadRequest { .. }));
    }

    #[test]
    fn log_topic_is_per_type() {
        assert_eq!(session().log_topic(), "changes/session");
    }
}
