//! # Orientation Integrator
//!
//! Euler integration of angular velocity into per-axis angles.
//!
//! ## Axis Mapping
//!
//! | Angle | Driven by | Sign |
//! |-------|-----------|------|
//! | `angles[0]` | Z rate | negated |
//! | `angles[1]` | Y rate | negated |
//! | `angles[2]` | X rate | negated |
//!
//! Each step computes `angle -= rate * (180 / π) * dt` and then wraps the
//! result back into (-360, 360] by repeatedly adding or subtracting a full
//! turn. There is no drift correction.

use super::Vector3;

/// Radians to degrees.
pub const RAD_TO_DEG: f64 = 180.0 / std::f64::consts::PI;

/// One full turn in degrees.
pub const FULL_TURN_DEG: f32 = 360.0;

/// Beyond this magnitude a remainder is taken before the wrap loop so the
/// loop stays bounded even for absurd rates or gaps between samples.
const WRAP_REDUCE_THRESHOLD_DEG: f32 = FULL_TURN_DEG * 16.0;

/// Reorders a device-frame rate into angle order: (Z, Y, X).
#[must_use]
pub fn remap_axes(rate: Vector3) -> [f64; 3] {
    [rate.z, rate.y, rate.x]
}

/// Wraps an angle into (-360, 360].
///
/// Values already in range are returned unchanged; `720.0` becomes `360.0`
/// and `-360.0` becomes `0.0`.
///
/// # Examples
///
/// ```
/// use imu_bridge::orientation::integrator::normalize_angle;
///
/// assert_eq!(normalize_angle(370.0), 10.0);
/// assert_eq!(normalize_angle(-730.0), -10.0);
/// assert_eq!(normalize_angle(360.0), 360.0);
/// ```
#[must_use]
pub fn normalize_angle(mut angle: f32) -> f32 {
    if !angle.is_finite() {
        return angle;
    }

    if angle.abs() > WRAP_REDUCE_THRESHOLD_DEG {
        let positive = angle > 0.0;
        angle %= FULL_TURN_DEG;
        // Repeated wrapping stops at 360 for positive multiples of a turn
        if positive && angle == 0.0 {
            angle = FULL_TURN_DEG;
        }
    }

    while angle > FULL_TURN_DEG {
        angle -= FULL_TURN_DEG;
    }
    while angle <= -FULL_TURN_DEG {
        angle += FULL_TURN_DEG;
    }
    angle
}

/// Performs one integration step of `dt_secs` seconds.
///
/// # Returns
///
/// * `Some([f32; 3])` - The new, normalized angles
/// * `None` - The step does not fit in an `f32` angle; callers keep the old state
#[must_use]
pub fn integrate(angles: [f32; 3], rate: Vector3, dt_secs: f64) -> Option<[f32; 3]> {
    let mut next = angles;

    for (angle, axis_rate) in next.iter_mut().zip(remap_axes(rate)) {
        let delta = (axis_rate * RAD_TO_DEG * dt_secs) as f32;
        if !delta.is_finite() {
            return None;
        }
        *angle = normalize_angle(*angle - delta);
    }

    Some(next)
}
