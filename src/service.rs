//! # IMU Service
//!
//! Lifecycle controller that starts and stops the sensor subscriptions and
//! the telemetry server as one activation.
//!
//! ## Start
//!
//! 1. Stop the previous activation, if any
//! 2. Bind the telemetry listener (failure aborts before touching sensors)
//! 3. Reset the motion state so the first sample sets a fresh baseline
//! 4. Subscribe to the gyroscope and accelerometer streams, unwinding on failure
//! 5. Spawn the accept loop
//!
//! ## Stop
//!
//! Cancels the activation token (closing the sample sink and the accept
//! loop together), unsubscribes both streams and waits a bounded time for
//! the accept loop to exit. Stopping an inactive service is a no-op.

use std::net::SocketAddr;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::Result;
use crate::orientation::SharedMotion;
use crate::sensor::{SampleSink, SensorKind, SensorSource};
use crate::server::{ServerSettings, ServerState, TelemetryServer};

/// One running activation
#[derive(Debug)]
struct Activation {
    cancel: CancellationToken,
    local_addr: SocketAddr,
    started_at: Instant,
    server: JoinHandle<u64>,
    state: watch::Receiver<ServerState>,
}

/// Sensor subscriptions plus telemetry server, started and stopped together
#[derive(Debug)]
pub struct ImuService<S: SensorSource> {
    source: S,
    motion: SharedMotion,
    bind_addr: SocketAddr,
    settings: ServerSettings,
    shutdown_timeout: Duration,
    activation: Option<Activation>,
}

impl<S: SensorSource> ImuService<S> {
    /// Create an inactive service
    ///
    /// # Arguments
    ///
    /// * `source` - Platform sensor subscription API
    /// * `bind_addr` - Telemetry listener address
    /// * `settings` - Per-request limits
    /// * `shutdown_timeout` - Upper bound on waiting for the accept loop in [`ImuService::stop`]
    #[must_use]
    pub fn new(source: S, bind_addr: SocketAddr, settings: ServerSettings, shutdown_timeout: Duration) -> Self {
        Self {
            source,
            motion: SharedMotion::new(),
            bind_addr,
            settings,
            shutdown_timeout,
            activation: None,
        }
    }

    /// Create an inactive service from the `[server]` section
    ///
    /// # Errors
    ///
    /// Returns error if the bind address is invalid
    pub fn from_config(source: S, config: &ServerConfig) -> Result<Self> {
        Ok(Self::new(
            source,
            config.socket_addr()?,
            ServerSettings::from(config),
            Duration::from_millis(config.shutdown_timeout_ms),
        ))
    }

    /// Shared motion state fed by this service's sensor subscriptions
    #[must_use]
    pub fn motion(&self) -> &SharedMotion {
        &self.motion
    }

    #[must_use]
    pub fn source(&self) -> &S {
        &self.source
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.activation.is_some()
    }

    /// Address of the active listener
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.activation.as_ref().map(|activation| activation.local_addr)
    }

    /// Current telemetry server state; `Stopped` when inactive
    #[must_use]
    pub fn server_state(&self) -> ServerState {
        self.activation
            .as_ref()
            .map_or(ServerState::Stopped, |activation| *activation.state.borrow())
    }

    /// Start a new activation
    ///
    /// Any running activation is stopped first, so calling this twice leaves
    /// exactly one listener.
    ///
    /// # Returns
    ///
    /// * `Result<SocketAddr>` - Address the telemetry server is listening on
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The listener cannot be bound (no sensor is subscribed)
    /// - A sensor stream cannot be subscribed (already subscribed streams are
    ///   unsubscribed and the listener is closed)
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.activation.is_some() {
            info!("IMU service already running, restarting");
            self.stop().await;
        }

        let cancel = CancellationToken::new();

        let server = match TelemetryServer::bind(
            self.bind_addr,
            self.motion.clone(),
            self.settings.clone(),
            cancel.clone(),
        )
        .await
        {
            Ok(server) => server,
            Err(e) => {
                error!("IMU service failed to start: {}", e);
                return Err(e);
            }
        };
        let local_addr = server.local_addr();

        self.motion.reset();
        let started_at = Instant::now();

        let sink = SampleSink::new(self.motion.clone(), cancel.clone());
        let mut subscribed = Vec::with_capacity(SensorKind::ALL.len());

        for kind in SensorKind::ALL {
            if let Err(e) = self.source.subscribe(kind, sink.clone()) {
                error!("IMU service failed to subscribe to {}: {}", kind, e);
                cancel.cancel();
                for kind in subscribed.into_iter().rev() {
                    self.source.unsubscribe(kind);
                }
                return Err(e);
            }
            debug!("Subscribed to {} samples", kind);
            subscribed.push(kind);
        }

        let state = server.state();
        let server = tokio::spawn(server.run());

        self.activation = Some(Activation {
            cancel,
            local_addr,
            started_at,
            server,
            state,
        });

        info!("IMU service started on {}", local_addr);
        Ok(local_addr)
    }

    /// Stop the current activation
    ///
    /// Idempotent, and safe to call when [`ImuService::start`] never
    /// completed. Waits at most the configured shutdown timeout for the accept
    /// loop before aborting it.
    pub async fn stop(&mut self) {
        let Some(mut activation) = self.activation.take() else {
            debug!("IMU service stop requested while inactive");
            return;
        };

        activation.cancel.cancel();

        for kind in SensorKind::ALL.into_iter().rev() {
            self.source.unsubscribe(kind);
        }

        match timeout(self.shutdown_timeout, &mut activation.server).await {
            Ok(Ok(served)) => debug!("Telemetry server answered {} requests", served),
            Ok(Err(e)) => warn!("Telemetry server task failed: {}", e),
            Err(_) => {
                warn!(
                    "Telemetry server did not stop within {:?}, aborting",
                    self.shutdown_timeout
                );
                activation.server.abort();
                let _ = activation.server.await;
            }
        }

        debug!("Accumulated acceleration at stop: {:?}", self.motion.acceleration());
        info!(
            "IMU service stopped after {:.1}s",
            activation.started_at.elapsed().as_secs_f64()
        );
    }
}

impl<S: SensorSource> Drop for ImuService<S> {
    fn drop(&mut self) {
        if let Some(activation) = self.activation.take() {
            activation.cancel.cancel();
            activation.server.abort();
            for kind in SensorKind::ALL {
                self.source.unsubscribe(kind);
            }
        }
    }
}
