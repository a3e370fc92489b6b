//! # Orientation Module
//!
//! Shared motion state fed by sensor samples and read by the telemetry server.
//!
//! This module handles:
//! - Integrating angular-velocity samples into three bounded angles (see [`integrator`])
//! - Accumulating acceleration samples into a parallel vector (see [`accel`])
//! - Guarding both vectors and the last-update timestamp behind one lock
//! - Handing out consistent [`OrientationSnapshot`] copies to readers
//!
//! ## Usage
//!
//! ```
//! use imu_bridge::orientation::{SharedMotion, Vector3};
//! use tokio::time::{Duration, Instant};
//!
//! let motion = SharedMotion::new();
//! let t0 = Instant::now();
//!
//! // First sample only establishes the baseline
//! motion.apply_angular_velocity(Vector3::new(0.0, 0.0, 1.0), t0);
//! motion.apply_angular_velocity(Vector3::new(0.0, 0.0, 1.0), t0 + Duration::from_millis(500));
//!
//! let snapshot = motion.snapshot();
//! assert!((snapshot.angles[0] + 28.6479).abs() < 0.01);
//! ```

pub mod accel;
pub mod integrator;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::time::Instant;
use tracing::warn;

/// Three-component sensor vector in the device frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vector3 {
    /// All components zero.
    pub const ZERO: Vector3 = Vector3 { x: 0.0, y: 0.0, z: 0.0 };

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns true when no component is NaN or infinite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<[f64; 3]> for Vector3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

/// What happened to a single sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// No previous timestamp existed; the sample only set the baseline.
    Baseline,
    /// The sample was integrated (or accumulated) into the state.
    Applied,
    /// The sample was non-finite or would overflow; state left unchanged.
    Rejected,
}

/// Consistent copy of the orientation angles and the last-update timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrientationSnapshot {
    /// Angles in degrees, each within (-360, 360].
    pub angles: [f32; 3],
    /// Timestamp of the most recent accepted sample of either kind.
    pub last_update: Option<Instant>,
}

/// Orientation angles, accumulated acceleration and the shared timestamp.
///
/// The integrator is `Uninitialized` while `last_update` is `None` and
/// `Ready` afterwards. Both sample kinds advance the same timestamp.
#[derive(Debug, Clone, Default)]
pub struct MotionState {
    angles: [f32; 3],
    acceleration: [f32; 3],
    last_update: Option<Instant>,
}

impl MotionState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one angular-velocity sample (rad/s) taken at `now`.
    ///
    /// `last_update` only moves forward: a sample stamped before the latest
    /// one integrates over a zero interval.
    pub fn apply_angular_velocity(&mut self, rate: Vector3, now: Instant) -> SampleOutcome {
        if !rate.is_finite() {
            warn!("Rejected non-finite angular velocity sample: {:?}", rate);
            return SampleOutcome::Rejected;
        }

        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return SampleOutcome::Baseline;
        };

        let dt = now.saturating_duration_since(last).as_secs_f64();
        match integrator::integrate(self.angles, rate, dt) {
            Some(angles) => {
                self.angles = angles;
                self.last_update = Some(last.max(now));
                SampleOutcome::Applied
            }
            None => {
                warn!("Rejected angular velocity sample that overflows the angle range: {:?} over {:.6}s", rate, dt);
                SampleOutcome::Rejected
            }
        }
    }

    /// Applies one acceleration sample (g) taken at `now`.
    pub fn apply_acceleration(&mut self, accel: Vector3, now: Instant) -> SampleOutcome {
        if !accel.is_finite() {
            warn!("Rejected non-finite acceleration sample: {:?}", accel);
            return SampleOutcome::Rejected;
        }

        let outcome = if self.last_update.is_some() {
            SampleOutcome::Applied
        } else {
            SampleOutcome::Baseline
        };
        accel::accumulate(&mut self.acceleration, accel);
        self.last_update = Some(self.last_update.map_or(now, |last| last.max(now)));
        outcome
    }

    #[must_use]
    pub fn snapshot(&self) -> OrientationSnapshot {
        OrientationSnapshot {
            angles: self.angles,
            last_update: self.last_update,
        }
    }

    /// Running acceleration sum. Not exposed on the wire.
    #[must_use]
    pub fn acceleration(&self) -> [f32; 3] {
        self.acceleration
    }

    /// Clears both vectors and returns the integrator to `Uninitialized`.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Cloneable, lock-guarded handle to a [`MotionState`].
///
/// Sensor callbacks write through `apply_*`, the server reads through
/// [`SharedMotion::snapshot`]. The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct SharedMotion {
    inner: Arc<Mutex<MotionState>>,
}

impl SharedMotion {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // No writer can panic between component updates, so a poisoned lock still
    // guards a consistent state.
    fn lock(&self) -> MutexGuard<'_, MotionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply_angular_velocity(&self, rate: Vector3, now: Instant) -> SampleOutcome {
        self.lock().apply_angular_velocity(rate, now)
    }

    pub fn apply_acceleration(&self, accel: Vector3, now: Instant) -> SampleOutcome {
        self.lock().apply_acceleration(accel, now)
    }

    #[must_use]
    pub fn snapshot(&self) -> OrientationSnapshot {
        self.lock().snapshot()
    }

    #[must_use]
    pub fn acceleration(&self) -> [f32; 3] {
        self.lock().acceleration()
    }

    pub fn reset(&self) {
        self.lock().reset();
    }
}
