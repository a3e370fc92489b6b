//! # Sensor Module
//!
//! Boundary between the platform's motion sensors and the shared motion state.
//!
//! This module handles:
//! - Sample types for the gyroscope (rad/s) and accelerometer (g) streams
//! - The [`SampleSink`] callback handle sources push samples into
//! - The [`SensorSource`] trait the lifecycle controller subscribes through
//! - Building a concrete source from configuration
//!
//! Available sources:
//! - [`simulated::SimulatedSource`]: constant vectors at a fixed rate
//! - [`replay::ReplaySource`]: timed playback of a JSONL recording

pub mod replay;
pub mod simulated;

use std::collections::HashMap;
use std::fmt;

use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::SensorConfig;
use crate::error::{ImuBridgeError, Result};
use crate::orientation::{SampleOutcome, SharedMotion, Vector3};

/// Motion sensor stream kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
pub enum SensorKind {
    /// Angular velocity in rad/s
    #[serde(rename = "gyro")]
    Gyroscope,
    /// Linear acceleration in g
    #[serde(rename = "accel")]
    Accelerometer,
}

impl SensorKind {
    /// Every stream, in subscription order.
    pub const ALL: [SensorKind; 2] = [SensorKind::Gyroscope, SensorKind::Accelerometer];
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Gyroscope => write!(f, "gyroscope"),
            SensorKind::Accelerometer => write!(f, "accelerometer"),
        }
    }
}

/// Callback handle a source delivers samples through.
///
/// Every clone shares the motion state and the activation's cancellation
/// token. Once the token is cancelled, samples are dropped without touching
/// the state, so late deliveries from a stopping source are harmless.
#[derive(Debug, Clone)]
pub struct SampleSink {
    motion: SharedMotion,
    cancel: CancellationToken,
}

impl SampleSink {
    #[must_use]
    pub fn new(motion: SharedMotion, cancel: CancellationToken) -> Self {
        Self { motion, cancel }
    }

    /// Delivers one gyroscope sample. Returns `None` after cancellation.
    pub fn on_angular_velocity(&self, rate: Vector3, now: Instant) -> Option<SampleOutcome> {
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(self.motion.apply_angular_velocity(rate, now))
    }

    /// Delivers one accelerometer sample. Returns `None` after cancellation.
    pub fn on_acceleration(&self, accel: Vector3, now: Instant) -> Option<SampleOutcome> {
        if self.cancel.is_cancelled() {
            return None;
        }
        Some(self.motion.apply_acceleration(accel, now))
    }

    /// Routes a sample to the callback matching `kind`.
    pub fn deliver(&self, kind: SensorKind, value: Vector3, now: Instant) -> Option<SampleOutcome> {
        match kind {
            SensorKind::Gyroscope => self.on_angular_velocity(value, now),
            SensorKind::Accelerometer => self.on_acceleration(value, now),
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Completes once the activation is stopped.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

/// Platform sensor subscription API
///
/// `subscribe` starts pushing samples of one kind into the sink until
/// `unsubscribe` is called or the sink is closed. Unsubscribing a stream that
/// is not active is a no-op.
#[cfg_attr(test, mockall::automock)]
pub trait SensorSource: Send {
    /// Start delivering samples of `kind` into `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the stream cannot be started
    fn subscribe(&mut self, kind: SensorKind, sink: SampleSink) -> Result<()>;

    /// Stop delivering samples of `kind`
    fn unsubscribe(&mut self, kind: SensorKind);

    /// Whether samples of `kind` are currently being delivered
    fn is_subscribed(&self, kind: SensorKind) -> bool;
}

impl<S: SensorSource + ?Sized> SensorSource for Box<S> {
    fn subscribe(&mut self, kind: SensorKind, sink: SampleSink) -> Result<()> {
        (**self).subscribe(kind, sink)
    }

    fn unsubscribe(&mut self, kind: SensorKind) {
        (**self).unsubscribe(kind)
    }

    fn is_subscribed(&self, kind: SensorKind) -> bool {
        (**self).is_subscribed(kind)
    }
}

/// Per-kind feed tasks owned by a source. Aborted on replace, remove and drop.
#[derive(Debug, Default)]
pub(crate) struct Feeds {
    tasks: HashMap<SensorKind, JoinHandle<()>>,
}

impl Feeds {
    pub(crate) fn insert(&mut self, kind: SensorKind, task: JoinHandle<()>) {
        if let Some(previous) = self.tasks.insert(kind, task) {
            previous.abort();
        }
    }

    pub(crate) fn remove(&mut self, kind: SensorKind) -> bool {
        match self.tasks.remove(&kind) {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_active(&self, kind: SensorKind) -> bool {
        self.tasks.get(&kind).is_some_and(|task| !task.is_finished())
    }
}

impl Drop for Feeds {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// Build the sensor source selected in `[sensors]`
///
/// # Errors
///
/// Returns error if the source name is unknown or the replay file cannot be loaded
pub fn from_config(config: &SensorConfig) -> Result<Box<dyn SensorSource>> {
    match config.source.as_str() {
        "simulated" => Ok(Box::new(simulated::SimulatedSource::new(
            config.rate_hz,
            Vector3::from(config.angular_velocity),
            Vector3::from(config.acceleration),
        ))),
        "replay" => Ok(Box::new(replay::ReplaySource::load(
            &config.replay_file,
            config.replay_loop,
        )?)),
        other => Err(ImuBridgeError::Sensor(format!("unknown sensor source '{}'", other))),
    }
}
