//! # Error Types
//!
//! Custom error types for IMU Bridge using `thiserror`.

use std::net::SocketAddr;

use thiserror::Error;

/// Main error type for IMU Bridge
#[derive(Debug, Error)]
pub enum ImuBridgeError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Telemetry listener could not be bound
    #[error("Failed to bind telemetry listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Sensor subscription errors
    #[error("Sensor error: {0}")]
    Sensor(String),

    /// Sample replay file errors
    #[error("Replay error: {0}")]
    Replay(String),

    /// Request the router cannot answer
    #[error("HTTP error: {0}")]
    Http(String),

    /// Malformed, oversized or interrupted HTTP exchange
    #[error("HTTP connection error: {0}")]
    Hyper(#[from] hyper::Error),
}

/// Result type alias for IMU Bridge
pub type Result<T> = std::result::Result<T, ImuBridgeError>;
