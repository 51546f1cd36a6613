//! Light-time and stellar-aberration corrections.
//!
//! Both corrections wrap the intersection machinery rather than live
//! inside it: aberration bends the inertial line of sight before it is
//! taken to the body frame, light time shifts the inertial-to-body
//! transform backward by the photon travel time (two fixed-point
//! passes, done by the engine).

use nalgebra::Vector3;

/// Speed of light in vacuum, meters per second.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Corrects an apparent line of sight for the observer's velocity.
///
/// Solves `c·l + v = k·l_obs` for the true direction `l` (unit) and
/// `k > 0`: classical velocity addition, within tolerance of the
/// relativistic form at orbital speeds. `observed` must be unit.
pub fn aberration_of_light(observed: &Vector3<f64>, velocity: &Vector3<f64>) -> Vector3<f64> {
    let b = observed.dot(velocity);
    let k = b + (b * b - velocity.norm_squared() + SPEED_OF_LIGHT * SPEED_OF_LIGHT).sqrt();
    (k * observed - velocity) / SPEED_OF_LIGHT
}

/// The inverse mapping: the direction an observer moving at `velocity`
/// sees for a true (geometric) direction. Used by the inverse-location
/// solver so both operations model the same light path.
pub fn apparent_los(true_los: &Vector3<f64>, velocity: &Vector3<f64>) -> Vector3<f64> {
    (SPEED_OF_LIGHT * true_los + velocity).normalize()
}
