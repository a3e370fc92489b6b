//! # IMU Bridge
//!
//! Serve gyroscope-integrated orientation over a plain-text HTTP endpoint.
//!
//! This application subscribes to the configured sensor source, integrates
//! the samples, and answers `/d`, `/c`, `/a`, `/m` and `/p` requests until
//! Ctrl+C.

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use imu_bridge::config::{Config, LoggingConfig};
use imu_bridge::sensor;
use imu_bridge::service::ImuService;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix for daily rolling log files
const LOG_FILE_PREFIX: &str = "imu-bridge.log";

/// Set up the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. When `log_dir` is
/// set, logs go to a daily rolling file through a non-blocking writer whose
/// guard must be held until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.log_dir.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.log_dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// Main entry point for IMU Bridge
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument or `config/default.toml`)
///    - Set up logging
///    - Build the sensor source
///
/// 2. **Activation**
///    - Bind the telemetry listener, subscribe both sensor streams
///    - Serve requests until Ctrl+C
///
/// 3. **Graceful Shutdown**
///    - Cancel the activation, unsubscribe, close the listener
///
/// # Errors
///
/// Returns error if:
/// - Configuration cannot be loaded
/// - The replay file cannot be loaded
/// - The telemetry port cannot be bound
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// curl http://localhost:2137/d
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging);

    info!("IMU Bridge v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Using {} sensor source", config.sensors.source);

    let source = sensor::from_config(&config.sensors)?;
    let mut service = ImuService::from_config(source, &config.server)?;

    let addr = service.start().await?;
    info!("Serving orientation at http://{}/d", addr);
    info!("Press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    info!("Received Ctrl+C, shutting down...");
    service.stop().await;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_path() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.server.port, 2137);
        assert_eq!(config.server.bind_address, "0.0.0.0");
    }
}
