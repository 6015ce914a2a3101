//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// MQTT listener address
    pub mqtt_addr: SocketAddr,
    /// Prometheus metrics listener address
    pub metrics_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables. Unset variables fall
    /// back to the defaults; only malformed values are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mqtt_addr = env::var("MQTT_ADDR").unwrap_or_else(|_| "0.0.0.0:1883".to_string());
        let metrics_addr = env::var("METRICS_ADDR").unwrap_or_else(|_| "0.0.0.0:2112".to_string());

        Ok(Self {
            mqtt_addr: mqtt_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("MQTT_ADDR"))?,
            metrics_addr: metrics_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("METRICS_ADDR"))?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid address format in {0}")]
    InvalidAddress(&'static str),
}
