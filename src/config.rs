//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::error::{ImuBridgeError, Result};

/// Sensor source names accepted in `[sensors] source`
pub const SENSOR_SOURCES: &[&str] = &["simulated", "replay"];

/// Log levels accepted in `[logging] level`
pub const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub sensors: SensorConfig,
    pub logging: LoggingConfig,
}

/// Telemetry server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    #[serde(default = "default_max_request_bytes")]
    pub max_request_bytes: usize,

    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Sensor source configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_source")]
    pub source: String,

    #[serde(default)]
    pub replay_file: String,

    #[serde(default)]
    pub replay_loop: bool,

    #[serde(default = "default_rate_hz")]
    pub rate_hz: u32,

    /// Simulated angular velocity in rad/s (x, y, z)
    #[serde(default = "default_angular_velocity")]
    pub angular_velocity: [f64; 3],

    /// Simulated acceleration in g (x, y, z)
    #[serde(default = "default_acceleration")]
    pub acceleration: [f64; 3],
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for daily rolling log files; empty logs to stdout
    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_bind_address() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 2137 }
fn default_request_timeout_ms() -> u64 { 2000 }
fn default_max_request_bytes() -> usize { 8192 }
fn default_shutdown_timeout_ms() -> u64 { 1000 }

fn default_sensor_source() -> String { "simulated".to_string() }
fn default_rate_hz() -> u32 { 100 }
fn default_angular_velocity() -> [f64; 3] { [0.0, 0.0, 0.1] }
fn default_acceleration() -> [f64; 3] { [0.0, 0.0, 1.0] }

fn default_log_level() -> String { "info".to_string() }

impl ServerConfig {
    /// Socket address the telemetry listener binds to
    ///
    /// # Errors
    ///
    /// Returns error if `bind_address` is not an IP address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        let ip: IpAddr = self.bind_address.parse().map_err(|_| {
            ImuBridgeError::Config(toml::de::Error::custom(format!(
                "bind_address '{}' is not a valid IP address",
                self.bind_address
            )))
        })?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use imu_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate server configuration
        if self.server.bind_address.is_empty() {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("bind_address cannot be empty")
            ));
        }

        self.server.socket_addr()?;

        if self.server.request_timeout_ms == 0 || self.server.request_timeout_ms > 60000 {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("request_timeout_ms must be between 1 and 60000")
            ));
        }

        if self.server.shutdown_timeout_ms == 0 || self.server.shutdown_timeout_ms > 10000 {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("shutdown_timeout_ms must be between 1 and 10000")
            ));
        }

        if self.server.max_request_bytes < 8192 || self.server.max_request_bytes > 65536 {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("max_request_bytes must be between 8192 and 65536")
            ));
        }

        // Validate sensor source
        if !SENSOR_SOURCES.contains(&self.sensors.source.as_str()) {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom(format!(
                    "sensor source must be one of: {}",
                    SENSOR_SOURCES.join(", ")
                ))
            ));
        }

        if self.sensors.source == "replay" && self.sensors.replay_file.is_empty() {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("replay_file cannot be empty when source is 'replay'")
            ));
        }

        if self.sensors.rate_hz == 0 || self.sensors.rate_hz > 1000 {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom("rate_hz must be between 1 and 1000")
            ));
        }

        for (name, vector) in [
            ("angular_velocity", self.sensors.angular_velocity),
            ("acceleration", self.sensors.acceleration),
        ] {
            if vector.iter().any(|v| !v.is_finite()) {
                return Err(ImuBridgeError::Config(
                    toml::de::Error::custom(format!("{} components must be finite", name))
                ));
            }
        }

        // Validate log level
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(ImuBridgeError::Config(
                toml::de::Error::custom(format!(
                    "log level must be one of: {}",
                    LOG_LEVELS.join(", ")
                ))
            ));
        }

        Ok(())
    }
}
