//! Boiler status detection from vibration magnitude.
//!
//! The gravity correction assumes an upright, stationary sensor: 9.8 m/s^2 is removed
//! from the z axis only. Mounting the sensor in another orientation leaves part of
//! gravity in the magnitude.
//!
//! There is no hysteresis or debouncing. A magnitude hovering around the threshold
//! flips the status on every sample.

use crate::sensor::Sample;

/// Gravity removed from the z axis, in m/s^2
pub const GRAVITY: f32 = 9.8;

/// Euclidean norm of the gravity-adjusted acceleration.
pub fn magnitude(sample: &Sample) -> f32 {
    let x = sample.x;
    let y = sample.y;
    let z = sample.z - GRAVITY;
    libm::sqrtf(x * x + y * y + z * z)
}

/// The boiler is running when the magnitude is strictly above the threshold.
pub fn is_running(magnitude: f32, threshold: f32) -> bool {
    magnitude > threshold
}
