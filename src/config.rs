//! Leasepool configuration.

use std::time::Duration;

use crate::LeasepoolError;

/// Default fixed lease lifetime.
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(30);

/// Configuration for the lease pool server.
///
/// All values have working defaults for a local Redis instance; production
/// deployments override them via the binary's command-line flags.
#[derive(Debug, Clone)]
pub struct LeasepoolConfig {
    /// Address the HTTP surface listens on (e.g., "127.0.0.1:8080").
    pub listen_addr: String,

    /// Connection URL for the backing Redis instance.
    pub redis_url: String,

    /// Namespace prefixed to every lease group key in the store.
    /// Each deployment sharing a Redis instance should use a unique
    /// namespace to avoid collisions.
    pub namespace: String,

    /// Fixed lifetime granted to a lease on creation, and added again on
    /// each renewing access.
    pub lease_duration: Duration,
}

impl Default for LeasepoolConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_string(),
            redis_url: "redis://127.0.0.1:6379".to_string(),
            namespace: "reserved:".to_string(),
            lease_duration: DEFAULT_LEASE_DURATION,
        }
    }
}

impl LeasepoolConfig {
    /// Validate configuration for obvious errors.
    pub fn validate(&self) -> Result<(), LeasepoolError> {
        if self.listen_addr.is_empty() {
            return Err(LeasepoolError::ConfigError(
                "listen_addr cannot be empty".to_string(),
            ));
        }
        if self.redis_url.is_empty() {
            return Err(LeasepoolError::ConfigError(
                "redis_url cannot be empty".to_string(),
            ));
        }
        if self.lease_duration.is_zero() {
            return Err(LeasepoolError::ConfigError(
                "lease_duration must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(LeasepoolConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_lease_duration_is_rejected() {
        let config = LeasepoolConfig {
            lease_duration: Duration::ZERO,
            ..LeasepoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeasepoolError::ConfigError(_))
        ));
    }

    #[test]
    fn empty_redis_url_is_rejected() {
        let config = LeasepoolConfig {
            redis_url: String::new(),
            ..LeasepoolConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LeasepoolError::ConfigError(_))
        ));
    }
}
