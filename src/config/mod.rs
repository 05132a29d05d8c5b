//! # Configuration
//!
//! Typed settings for the lifecycle engine, loaded by [`ConfigManager`] from TOML files
//! layered with environment overrides.

pub mod error;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_EVENT_CHANNEL_CAPACITY, DEFAULT_LOCK_KEY_PREFIX, DEFAULT_LOCK_TTL_SECONDS,
    DEFAULT_TICKET_SUPPRESSED_REASONS,
};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SampleLifecycleConfig {
    pub database: DatabaseConfig,
    pub receiving: ReceivingConfig,
    pub events: EventsConfig,
    pub rejection: RejectionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/sample_lifecycle_development".to_string(),
            max_connections: 10,
            acquire_timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceivingConfig {
    /// Allow one receive batch to span several orders
    pub multi_order_receiving_enabled: bool,
    pub lock_ttl_seconds: u64,
    pub lock_key_prefix: String,
}

impl Default for ReceivingConfig {
    fn default() -> Self {
        Self {
            multi_order_receiving_enabled: false,
            lock_ttl_seconds: DEFAULT_LOCK_TTL_SECONDS,
            lock_key_prefix: DEFAULT_LOCK_KEY_PREFIX.to_string(),
        }
    }
}

impl ReceivingConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_seconds)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventsConfig {
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RejectionConfig {
    pub ticket_suppressed_reasons: Vec<String>,
}

impl Default for RejectionConfig {
    fn default() -> Self {
        Self {
            ticket_suppressed_reasons: DEFAULT_TICKET_SUPPRESSED_REASONS
                .iter()
                .map(|r| r.to_string())
                .collect(),
        }
    }
}

impl RejectionConfig {
    /// Case-insensitive match after trimming
    pub fn is_ticket_suppressed(&self, reason: &str) -> bool {
        let reason = reason.trim();
        self.ticket_suppressed_reasons
            .iter()
            .any(|r| r.trim().eq_ignore_ascii_case(reason))
    }
}

impl SampleLifecycleConfig {
    /// Validate configuration for consistency and required fields
    pub fn validate(&self) -> ConfigResult<()> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigurationError::missing_required_field(
                "database.url",
                "database configuration",
            ));
        }

        if self.database.max_connections == 0 {
            return Err(ConfigurationError::invalid_value(
                "database.max_connections",
                "0",
                "pool size must be greater than 0",
            ));
        }

        if self.receiving.lock_ttl_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "receiving.lock_ttl_seconds",
                "0",
                "lock ttl must be greater than 0",
            ));
        }

        if self.events.channel_capacity == 0 {
            return Err(ConfigurationError::invalid_value(
                "events.channel_capacity",
                "0",
                "channel capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SampleLifecycleConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.receiving.multi_order_receiving_enabled);
        assert_eq!(config.receiving.lock_ttl(), Duration::from_secs(3600));
        assert_eq!(config.events.channel_capacity, 1000);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut config = SampleLifecycleConfig::default();
        config.receiving.lock_ttl_seconds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));

        let mut config = SampleLifecycleConfig::default();
        config.database.url = " ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingRequiredField { .. })
        ));
    }

    #[test]
    fn test_ticket_suppression_is_case_insensitive() {
        let rejection = RejectionConfig::default();
        assert!(rejection.is_ticket_suppressed("  duplicate test (na) "));
        assert!(rejection.is_ticket_suppressed("Sync Error / Barcode Error (NA)"));
        assert!(!rejection.is_ticket_suppressed("Hemolysed"));
    }
}
