use serde::{Deserialize, Serialize};
use std::fmt;

/// Deterministic string encoding of a resource's identity and type:
/// `/key1/val1/.../keyN/valN/type`, keys in descriptor-declared order.
///
/// Doubles as the persistence-key suffix, the subscription-room id, and the
/// scope of the per-type log topic. Built and parsed by the descriptor,
/// which owns the key order; this newtype only carries the encoded form.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CanonicalPath(pub String);

impl CanonicalPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }
}

impl fmt::Display for CanonicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for CanonicalPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
