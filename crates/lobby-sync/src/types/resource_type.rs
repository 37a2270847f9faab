use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique type tag for a synchronized resource (e.g., "session", "player").
///
/// The empty string is reserved as the base/sentinel type and never names a
/// concrete resource; descriptor construction rejects it.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResourceType(pub String);

impl ResourceType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The reserved base/sentinel type.
    pub fn base() -> Self {
        Self(String::new())
    }

    pub fn is_base(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ResourceType {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
