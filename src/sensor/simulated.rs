//! # Simulated Source
//!
//! Emits constant gyroscope and accelerometer readings at a fixed rate.
//! Useful on hosts without motion sensors and for exercising the server.

use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::debug;

use super::{Feeds, SampleSink, SensorKind, SensorSource};
use crate::error::Result;
use crate::orientation::Vector3;

/// Constant-rate synthetic sensor source
#[derive(Debug)]
pub struct SimulatedSource {
    period: Duration,
    angular_velocity: Vector3,
    acceleration: Vector3,
    feeds: Feeds,
}

impl SimulatedSource {
    /// Creates a source emitting `rate_hz` samples per second on each stream.
    ///
    /// # Arguments
    ///
    /// * `rate_hz` - Samples per second per stream (0 is treated as 1)
    /// * `angular_velocity` - Gyroscope reading in rad/s
    /// * `acceleration` - Accelerometer reading in g
    #[must_use]
    pub fn new(rate_hz: u32, angular_velocity: Vector3, acceleration: Vector3) -> Self {
        Self {
            period: Duration::from_secs(1) / rate_hz.max(1),
            angular_velocity,
            acceleration,
            feeds: Feeds::default(),
        }
    }

    /// Interval between consecutive samples of one stream
    #[must_use]
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl SensorSource for SimulatedSource {
    fn subscribe(&mut self, kind: SensorKind, sink: SampleSink) -> Result<()> {
        let value = match kind {
            SensorKind::Gyroscope => self.angular_velocity,
            SensorKind::Accelerometer => self.acceleration,
        };

        let task = tokio::spawn(simulated_feed(kind, value, self.period, sink));
        self.feeds.insert(kind, task);
        debug!("Subscribed to simulated {} at {:?} intervals", kind, self.period);
        Ok(())
    }

    fn unsubscribe(&mut self, kind: SensorKind) {
        if self.feeds.remove(kind) {
            debug!("Unsubscribed from simulated {}", kind);
        }
    }

    fn is_subscribed(&self, kind: SensorKind) -> bool {
        self.feeds.is_active(kind)
    }
}

async fn simulated_feed(kind: SensorKind, value: Vector3, period: Duration, sink: SampleSink) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = sink.closed() => break,
            tick = ticker.tick() => {
                sink.deliver(kind, value, tick);
            }
        }
    }
}
