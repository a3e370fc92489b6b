//! # Acceleration Accumulator
//!
//! Running sum of acceleration samples (in g) with the same (Z, Y, X) axis
//! order as the integrator but without sign negation. No decay and no
//! bound: the sum is cleared only when the service starts a new activation.
//!
//! The accumulated vector is internal. Telemetry responses carry literal
//! zeros in its place.

use super::Vector3;

/// Adds one sample to the running sum.
pub fn accumulate(values: &mut [f32; 3], sample: Vector3) {
    values[0] += sample.z as f32;
    values[1] += sample.y as f32;
    values[2] += sample.x as f32;
}
