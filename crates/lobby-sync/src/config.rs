use crate::error::SyncError;
use std::time::Duration;

/// Configuration for the state-synchronization engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// TTL applied to every persisted snapshot so abandoned resources
    /// self-expire. Default: 24h.
    pub snapshot_ttl: Duration,
    /// Change-log entries older than this are eligible for trimming.
    /// Default: 24h.
    pub log_retention: Duration,
    /// Upper bound on how long a blocking-poll log read waits for new
    /// entries before returning an empty batch. Default: 10s.
    pub log_read_timeout: Duration,
    /// Maximum entries handed to a consumer in one batch. Default: 100.
    pub log_batch_max: usize,
    /// Length of server-generated creation tokens. Default: 6.
    pub creation_token_len: usize,
    /// How many times `post` retries the id generator when the generated
    /// identity is already taken. Default: 10.
    pub creation_max_attempts: u32,
    /// Capacity of the per-connection outbound envelope channel a transport
    /// should allocate. A full channel drops the message for that
    /// subscriber. Default: 64.
    pub subscriber_buffer: usize,
}

impl SyncConfig {
    /// Validate configuration values. Returns an error if any value is invalid.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.snapshot_ttl.is_zero() {
            return Err(SyncError::InvalidConfig {
                reason: "snapshot_ttl must be > 0".to_string(),
            });
        }
        if self.log_retention.is_zero() {
            return Err(SyncError::InvalidConfig {
                reason: "log_retention must be > 0".to_string(),
            });
        }
        if self.log_read_timeout.is_zero() {
            return Err(SyncError::InvalidConfig {
                reason: "log_read_timeout must be > 0".to_string(),
            });
        }
        if self.log_batch_max == 0 {
            return Err(SyncError::InvalidConfig {
                reason: "log_batch_max must be >= 1".to_string(),
            });
        }
        if self.creation_token_len == 0 {
            return Err(SyncError::InvalidConfig {
                reason: "creation_token_len must be >= 1".to_string(),
            });
        }
        if self.creation_max_attempts == 0 {
            return Err(SyncError::InvalidConfig {
                reason: "creation_max_attempts must be >= 1".to_string(),
            });
        }
        if self.subscriber_buffer == 0 {
            return Err(SyncError::InvalidConfig {
                reason: "subscriber_buffer must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(24 * 60 * 60),
            log_retention: Duration::from_secs(24 * 60 * 60),
            log_read_timeout: Duration::from_secs(10),
            log_batch_max: 100,
            creation_token_len: 6,
            creation_max_attempts: 10,
            subscriber_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SyncConfig::default().validate().unwrap();
    }

    #[test]
    fn default_values() {
        let config = SyncConfig::default();
        assert_eq!(config.log_batch_max, 100);
        assert_eq!(config.creation_token_len, 6);
        assert_eq!(config.log_read_timeout, Duration::from_secs(10));
        assert_eq!(config.snapshot_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn custom_config() {
        let config = SyncConfig {
            log_batch_max: 5,
            ..Default::default()
        };
        assert_eq!(config.log_batch_max, 5);
        // Other fields keep defaults
        assert_eq!(config.creation_token_len, 6);
    }

    #[test]
    fn validate_zero_batch_max() {
        let config = SyncConfig {
            log_batch_max: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_batch_max"), "got: {err}");
    }

    #[test]
    fn validate_zero_duration() {
        let config = SyncConfig {
            log_read_timeout: Duration::ZERO,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_read_timeout"), "got: {err}");
    }

    #[test]
    fn validate_zero_token_len() {
        let config = SyncConfig {
            creation_token_len: 0,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("creation_token_len"), "got: {err}");
    }
}
