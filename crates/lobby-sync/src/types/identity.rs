use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Named string keys uniquely addressing one resource instance.
///
/// Stored unordered; the descriptor's identity-key list supplies the
/// canonical order when a path or wire form is produced. Identity fields
/// never change after creation.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Identity(HashMap<String, String>);

impl Identity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl FromIterator<(String, String)> for Identity {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_insertion_order() {
        let a = Identity::new().with("a", "1").with("b", "2");
        let b = Identity::new().with("b", "2").with("a", "1");
        assert_eq!(a, b);
    }

    #[test]
    fn serde_roundtrip_as_flat_map() {
        let id = Identity::new().with("sessionId", "ABC123");
        let json = serde_json::to_value(&id).unwrap();
        assert_eq!(json, serde_json::json!({"sessionId": "ABC123"}));
        let back: Identity = serde_json::from_value(json).unwrap();
        assert_eq!(back, id);
    }
}
