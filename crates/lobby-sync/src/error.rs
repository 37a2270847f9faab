use crate::types::{CanonicalPath, ResourceType};

/// Errors that can occur in the state-synchronization engine.
///
/// The HTTP layer maps these onto status codes: `NotFound` → 404,
/// `Forbidden` → 403, `BadRequest` → 400, everything transport-ish → 500.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("resource {path} not found")]
    NotFound { path: CanonicalPath },

    #[error("identity mismatch reading {path}")]
    Forbidden { path: CanonicalPath },

    #[error("bad request: {reason}")]
    BadRequest { reason: String },

    #[error("resource {path} is soft-deleted and rejects mutation")]
    Deleted { path: CanonicalPath },

    #[error("persistence error: {reason}")]
    Persistence {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("change log unavailable for type {resource_type}: {reason}")]
    LogUnavailable {
        resource_type: ResourceType,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("engine is shutting down")]
    ShuttingDown,
}

impl SyncError {
    pub fn bad_request(reason: impl Into<String>) -> Self {
        SyncError::BadRequest {
            reason: reason.into(),
        }
    }

    pub fn persistence(reason: impl Into<String>) -> Self {
        SyncError::Persistence {
            reason: reason.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages() {
        let err = SyncError::NotFound {
            path: CanonicalPath::new("/sessionId/ABC123/session"),
        };
        assert_eq!(err.to_string(), "resource /sessionId/ABC123/session not found");

        let err = SyncError::bad_request("duplicate identity key");
        assert_eq!(err.to_string(), "bad request: duplicate identity key");

        let err = SyncError::LogUnavailable {
            resource_type: ResourceType::new("session"),
            reason: "append failed".into(),
            source: None,
        };
        assert_eq!(
            err.to_string(),
            "change log unavailable for type session: append failed"
        );
    }

    #[test]
    fn errors_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SyncError>();
    }
}
