//! Swimming headings and the resulting displacement.

use std::f64::consts::PI;

use crate::units::meters_to_degrees;

/// Swimming velocity in m/s along `heading + theta` radians (0 is east).
pub fn cardinal_velocity(speed: f64, heading: f64, theta: f64) -> (f64, f64) {
    let direction = heading + theta;
    (speed * direction.cos(), speed * direction.sin())
}

/// Swimming velocity in m/s against the local current `(u, v)`.
///
/// The speed never exceeds the current magnitude, so a still current yields no swimming.
pub fn rheotaxis_velocity(speed: f64, u: f64, v: f64, theta: f64) -> (f64, f64) {
    let direction = v.atan2(u) + PI + theta;
    let speed = speed.min(u.hypot(v));
    (speed * direction.cos(), speed * direction.sin())
}

/// Degrees travelled in `dt` seconds at velocity `(u, v)` from latitude `lat`.
pub fn displacement_degrees(u: f64, v: f64, dt: f64, lat: f64) -> (f64, f64) {
    meters_to_degrees(u * dt, v * dt, lat)
}
