use crate::epoch::Epoch;
use nalgebra::{UnitQuaternion, Vector3};

/// A dated kinematic transform between two Cartesian frames.
///
/// Maps source-frame coordinates to destination-frame coordinates as
/// `p_dst = q·p_src + t`, carrying the first time-derivatives of both
/// parts: `velocity = dt/dt` and `spin`, the angular velocity of the
/// source frame seen in the destination frame. The derivatives make
/// velocity transformation, composition and small time shifts exact to
/// first order, which is what the light-time compensation leans on.
#[derive(Clone, Copy, Debug)]
pub struct Transform {
    date: Epoch,
    translation: Vector3<f64>,
    velocity: Vector3<f64>,
    rotation: UnitQuaternion<f64>,
    spin: Vector3<f64>,
}

impl Transform {
    /// The identity transform at `date`.
    pub fn identity(date: Epoch) -> Self {
        Self {
            date,
            translation: Vector3::zeros(),
            velocity: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            spin: Vector3::zeros(),
        }
    }

    /// A transform from its parts.
    pub fn new(
        date: Epoch,
        translation: Vector3<f64>,
        velocity: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        spin: Vector3<f64>,
    ) -> Self {
        Self {
            date,
            translation,
            velocity,
            rotation,
            spin,
        }
    }

    /// The date the transform is valid at.
    pub fn date(&self) -> Epoch {
        self.date
    }

    /// Position of the source-frame origin in the destination frame.
    pub fn translation(&self) -> Vector3<f64> {
        self.translation
    }

    /// Velocity of the source-frame origin in the destination frame.
    pub fn velocity(&self) -> Vector3<f64> {
        self.velocity
    }

    /// Rotation from source to destination coordinates.
    pub fn rotation(&self) -> UnitQuaternion<f64> {
        self.rotation
    }

    /// Angular velocity of the source frame, destination coordinates.
    pub fn spin(&self) -> Vector3<f64> {
        self.spin
    }

    /// Transforms a position.
    pub fn position(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Transforms a free vector (directions, lines of sight).
    pub fn vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Velocity in the destination frame of a point with source-frame
    /// position `p` and source-frame velocity `v`.
    pub fn velocity_of(&self, p: &Vector3<f64>, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v + self.spin.cross(&(self.rotation * p)) + self.velocity
    }

    /// Left-to-right composition: `self` maps A to B, `second` maps B to
    /// C, the result maps A to C at `self`'s date.
    pub fn compose(&self, second: &Transform) -> Transform {
        let rotated = second.rotation * self.translation;
        Transform {
            date: self.date,
            translation: rotated + second.translation,
            velocity: second.rotation * self.velocity
                + second.spin.cross(&rotated)
                + second.velocity,
            rotation: second.rotation * self.rotation,
            spin: second.spin + second.rotation * self.spin,
        }
    }

    /// The inverse transform, derivatives included.
    pub fn inverse(&self) -> Transform {
        let inv = self.rotation.inverse();
        Transform {
            date: self.date,
            translation: -(inv * self.translation),
            velocity: -(inv * (self.velocity - self.spin.cross(&self.translation))),
            rotation: inv,
            spin: -(inv * self.spin),
        }
    }

    /// Shifts the transform by `dt` seconds: the translation moves
    /// linearly with the velocity and the rotation advances by
    /// `spin × dt`. Valid for small `dt` only; light-time compensation
    /// uses shifts of a few milliseconds.
    #[must_use]
    pub fn shifted_by(&self, dt: f64) -> Transform {
        Transform {
            date: self.date + dt,
            translation: self.translation + self.velocity * dt,
            velocity: self.velocity,
            rotation: UnitQuaternion::from_scaled_axis(self.spin * dt) * self.rotation,
            spin: self.spin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_3;

    fn sample() -> Transform {
        Transform::new(
            Epoch::REFERENCE,
            Vector3::new(7.0e6, -1.0e5, 2.0e4),
            Vector3::new(12.0, 7_400.0, -3.0),
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_3),
            Vector3::new(1.0e-3, -2.0e-4, 7.0e-5),
        )
    }

    #[test]
    fn inverse_round_trips_positions_and_velocities() {
        let t = sample();
        let inv = t.inverse();
        let p = Vector3::new(1.0e5, -3.0e4, 8.0e3);
        let v = Vector3::new(15.0, -3.0, 0.5);
        let back = inv.position(&t.position(&p));
        assert_abs_diff_eq!(back, p, epsilon = 1.0e-6);
        let v_dst = t.velocity_of(&p, &v);
        let back_v = inv.velocity_of(&t.position(&p), &v_dst);
        assert_abs_diff_eq!(back_v, v, epsilon = 1.0e-9);
    }

    #[test]
    fn composition_with_inverse_is_identity() {
        let t = sample();
        let id = t.compose(&t.inverse());
        assert_abs_diff_eq!(id.translation(), Vector3::zeros(), epsilon = 1.0e-6);
        assert_abs_diff_eq!(id.velocity(), Vector3::zeros(), epsilon = 1.0e-9);
        assert_abs_diff_eq!(id.spin(), Vector3::zeros(), epsilon = 1.0e-18);
        assert_abs_diff_eq!(id.rotation().angle(), 0.0, epsilon = 1.0e-12);
    }

    #[test]
    fn composition_is_associative() {
        let t1 = sample();
        let t2 = t1.inverse().shifted_by(3.0);
        let t3 = Transform::new(
            Epoch::REFERENCE,
            Vector3::new(0.0, 5.0, -9.0),
            Vector3::new(0.1, 0.0, 0.2),
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.3),
            Vector3::new(0.0, 1.0e-4, 0.0),
        );
        let left = t1.compose(&t2).compose(&t3);
        let right = t1.compose(&t2.compose(&t3));
        let p = Vector3::new(1.0e6, 2.0e6, -5.0e5);
        assert_abs_diff_eq!(left.position(&p), right.position(&p), epsilon = 1.0e-4);
        assert_abs_diff_eq!(
            left.velocity_of(&p, &Vector3::zeros()),
            right.velocity_of(&p, &Vector3::zeros()),
            epsilon = 1.0e-7
        );
    }

    #[test]
    fn shift_moves_a_corotating_point_consistently() {
        // a transform spinning about z: a point fixed in the source
        // frame must move the way the spin says
        let spin = Vector3::new(0.0, 0.0, 7.292e-5);
        let t = Transform::new(
            Epoch::REFERENCE,
            Vector3::zeros(),
            Vector3::zeros(),
            UnitQuaternion::identity(),
            spin,
        );
        let p = Vector3::new(6.4e6, 0.0, 0.0);
        let dt = 0.5;
        let moved = t.shifted_by(dt).position(&p);
        let predicted = t.position(&p) + t.velocity_of(&p, &Vector3::zeros()) * dt;
        // second order in spin·dt
        assert_abs_diff_eq!(moved, predicted, epsilon = 1.0e-2);
    }
}
