use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::ws::registry::RelaySettings;

/// What to do with a peer whose outbound queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlowConsumerPolicy {
    /// Drop frames for that peer and send it a full snapshot once it drains.
    #[default]
    Drop,
    /// Close the peer's connection.
    Disconnect,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Environment (dev, staging, prod)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// CORS allowed origins, comma separated
    pub cors_origins: Option<String>,

    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default = "default_service_name")]
    pub cloud_service_name: String,

    /// JWT secret key
    pub cloud_auth_jwt_secret: Option<String>,

    /// Database URL
    pub db_url: Option<String>,

    /// Quiet period before a dirty document is saved
    #[serde(default = "default_persist_debounce_ms")]
    pub persist_debounce_ms: u64,

    /// Interval between liveness pings
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,

    /// Frames buffered per connection
    #[serde(default = "default_outbound_queue_capacity")]
    pub outbound_queue_capacity: usize,

    #[serde(default)]
    pub slow_consumer_policy: SlowConsumerPolicy,

    /// How long a presence entry survives without being refreshed
    #[serde(default = "default_presence_ttl_secs")]
    pub presence_ttl_secs: u64,

    /// Grant every authenticated user edit access when no database is configured
    #[serde(default)]
    pub dev_access_all: bool,
}

impl Config {
    /// Load configuration from environment variables or app.env file
    pub fn load() -> Result<Self, ConfigError> {
        // Try to load from app.env file first
        if std::path::Path::new("app.env").exists() {
            dotenvy::from_filename("app.env").ok();
        } else {
            dotenvy::dotenv().ok();
        }

        match envy::from_env::<Config>() {
            Ok(config) => {
                config.validate()?;
                info!("Configuration loaded successfully");
                Ok(config)
            }
            Err(e) => {
                error!("Failed to load configuration: {}", e);
                Err(ConfigError::EnvError(e))
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.outbound_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "outbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the full server address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Check if running in development mode
    pub fn is_development(&self) -> bool {
        self.environment.to_lowercase() == "dev" || self.environment.to_lowercase() == "development"
    }

    pub fn relay_settings(&self) -> RelaySettings {
        RelaySettings {
            debounce: Duration::from_millis(self.persist_debounce_ms),
            heartbeat: Duration::from_secs(self.heartbeat_interval_secs),
            outbound_capacity: self.outbound_queue_capacity,
            slow_consumer: self.slow_consumer_policy,
        }
    }

    pub fn presence_ttl(&self) -> Duration {
        Duration::from_secs(self.presence_ttl_secs)
    }

    pub fn cors_origin_list(&self) -> Vec<String> {
        self.cors_origins
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
            cors_origins: None,
            cloud_service_name: default_service_name(),
            cloud_auth_jwt_secret: None,
            db_url: None,
            persist_debounce_ms: default_persist_debounce_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            outbound_queue_capacity: default_outbound_queue_capacity(),
            slow_consumer_policy: SlowConsumerPolicy::default(),
            presence_ttl_secs: default_presence_ttl_secs(),
            dev_access_all: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable error: {0}")]
    EnvError(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

// Default value functions
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "colabri-relay".to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_persist_debounce_ms() -> u64 {
    2_000
}

fn default_heartbeat_interval_secs() -> u64 {
    30
}

fn default_outbound_queue_capacity() -> usize {
    256
}

fn default_presence_ttl_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_relay_defaults() {
        let config = Config::default();
        let settings = config.relay_settings();
        let expected = RelaySettings::default();
        assert_eq!(settings.debounce, expected.debounce);
        assert_eq!(settings.heartbeat, expected.heartbeat);
        assert_eq!(settings.outbound_capacity, expected.outbound_capacity);
        assert_eq!(settings.slow_consumer, SlowConsumerPolicy::Drop);
        assert_eq!(config.server_address(), "0.0.0.0:3000");
        assert!(config.is_development());
    }

    #[test]
    fn test_policy_parses_lowercase() {
        let policy: SlowConsumerPolicy = serde_json::from_str("\"disconnect\"").unwrap();
        assert_eq!(policy, SlowConsumerPolicy::Disconnect);
    }

    #[test]
    fn test_cors_origin_list_trims_entries() {
        let config = Config {
            cors_origins: Some("https://a.example, https://b.example ,".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.cors_origin_list(),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = Config {
            outbound_queue_capacity: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }
}
