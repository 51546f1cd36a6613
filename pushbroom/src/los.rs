//! Composable line-of-sight pipelines.
//!
//! A sensor's viewing directions start as a raw fan of vectors in the
//! spacecraft frame and go through a sequence of transforms: fixed
//! mounting rotations, scale corrections, and time-dependent polynomial
//! rotations modelling thermo-elastic drift. Every transform exposes
//! named scalar parameters; the whole pipeline is differentiable with
//! respect to any selected subset of them through [`DualSeed`].

use crate::{
    dual::{Dual, DualSeed, DualVector3},
    epoch::Epoch,
};
use nalgebra::{Unit, UnitQuaternion, Vector3};

/// One step of a line-of-sight pipeline.
///
/// Time-independent transforms simply ignore the date argument; there is
/// a single time-parametric path through the pipeline.
pub trait LosTransform {
    /// Transforms one viewing direction.
    fn transform(&self, index: usize, los: Vector3<f64>, date: Epoch) -> Vector3<f64>;

    /// Dual-number variant propagating partials of the selected
    /// parameters.
    fn transform_dual(
        &self,
        index: usize,
        los: DualVector3,
        date: Epoch,
        seed: &DualSeed,
    ) -> DualVector3;

    /// Names of the scalar parameters this transform exposes.
    fn parameters(&self) -> Vec<String>;

    /// Current value of a parameter, if owned by this transform.
    fn parameter(&self, name: &str) -> Option<f64>;

    /// Updates a parameter; returns false when the name is not owned.
    fn set_parameter(&mut self, name: &str, value: f64) -> bool;
}

/// A constant rotation around a fixed axis, with the angle exposed as a
/// calibration parameter.
pub struct FixedRotation {
    name: String,
    axis: Unit<Vector3<f64>>,
    angle: f64,
}

impl FixedRotation {
    pub fn new(name: impl Into<String>, axis: Vector3<f64>, angle: f64) -> Self {
        Self {
            name: name.into(),
            axis: Unit::new_normalize(axis),
            angle,
        }
    }
}

impl LosTransform for FixedRotation {
    fn transform(&self, _index: usize, los: Vector3<f64>, _date: Epoch) -> Vector3<f64> {
        UnitQuaternion::from_axis_angle(&self.axis, self.angle) * los
    }

    fn transform_dual(
        &self,
        _index: usize,
        los: DualVector3,
        _date: Epoch,
        seed: &DualSeed,
    ) -> DualVector3 {
        let angle = match seed.slot(&self.name) {
            Some(slot) => Dual::variable(self.angle, slot, seed),
            None => Dual::constant(self.angle, seed),
        };
        los.rotate_about(&self.axis, &angle, seed)
    }

    fn parameters(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == self.name).then_some(self.angle)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        if name == self.name {
            self.angle = value;
            true
        } else {
            false
        }
    }
}

/// A rotation whose angle is a polynomial in `t - t_ref`, one parameter
/// per coefficient, named `<name>[k]`.
pub struct PolynomialRotation {
    name: String,
    axis: Unit<Vector3<f64>>,
    reference_date: Epoch,
    coefficients: Vec<f64>,
}

impl PolynomialRotation {
    pub fn new(
        name: impl Into<String>,
        axis: Vector3<f64>,
        reference_date: Epoch,
        coefficients: Vec<f64>,
    ) -> Self {
        Self {
            name: name.into(),
            axis: Unit::new_normalize(axis),
            reference_date,
            coefficients,
        }
    }

    fn angle(&self, date: Epoch) -> f64 {
        let dt = date - self.reference_date;
        self.coefficients
            .iter()
            .rev()
            .fold(0.0, |acc, &c| acc * dt + c)
    }

    fn coefficient_name(&self, k: usize) -> String {
        format!("{}[{k}]", self.name)
    }
}

impl LosTransform for PolynomialRotation {
    fn transform(&self, _index: usize, los: Vector3<f64>, date: Epoch) -> Vector3<f64> {
        UnitQuaternion::from_axis_angle(&self.axis, self.angle(date)) * los
    }

    fn transform_dual(
        &self,
        _index: usize,
        los: DualVector3,
        date: Epoch,
        seed: &DualSeed,
    ) -> DualVector3 {
        let dt = date - self.reference_date;
        // Horner in dual space so coefficient partials flow through
        let mut angle = Dual::constant(0.0, seed);
        for (k, &c) in self.coefficients.iter().enumerate().rev() {
            let coefficient = match seed.slot(&self.coefficient_name(k)) {
                Some(slot) => Dual::variable(c, slot, seed),
                None => Dual::constant(c, seed),
            };
            angle = angle.scale(dt).add(&coefficient);
        }
        los.rotate_about(&self.axis, &angle, seed)
    }

    fn parameters(&self) -> Vec<String> {
        (0..self.coefficients.len())
            .map(|k| self.coefficient_name(k))
            .collect()
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (0..self.coefficients.len())
            .find(|&k| self.coefficient_name(k) == name)
            .map(|k| self.coefficients[k])
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        for k in 0..self.coefficients.len() {
            if self.coefficient_name(k) == name {
                self.coefficients[k] = value;
                return true;
            }
        }
        false
    }
}

/// A scaling of the spacecraft-frame Z component, modelling focal-length
/// calibration. The pipeline normalization restores unit length.
pub struct FixedZHomothety {
    name: String,
    factor: f64,
}

impl FixedZHomothety {
    pub fn new(name: impl Into<String>, factor: f64) -> Self {
        Self {
            name: name.into(),
            factor,
        }
    }
}

impl LosTransform for FixedZHomothety {
    fn transform(&self, _index: usize, los: Vector3<f64>, _date: Epoch) -> Vector3<f64> {
        Vector3::new(los.x, los.y, self.factor * los.z)
    }

    fn transform_dual(
        &self,
        _index: usize,
        los: DualVector3,
        _date: Epoch,
        seed: &DualSeed,
    ) -> DualVector3 {
        let factor = match seed.slot(&self.name) {
            Some(slot) => Dual::variable(self.factor, slot, seed),
            None => Dual::constant(self.factor, seed),
        };
        DualVector3 {
            x: los.x,
            y: los.y,
            z: los.z.mul(&factor),
        }
    }

    fn parameters(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn parameter(&self, name: &str) -> Option<f64> {
        (name == self.name).then_some(self.factor)
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        if name == self.name {
            self.factor = value;
            true
        } else {
            false
        }
    }
}

/// Provider of unit viewing directions in the spacecraft frame.
pub trait LosProvider {
    /// Number of pixels across the line.
    fn pixel_count(&self) -> usize;

    /// Unit line of sight of `index` at `date`, spacecraft frame.
    fn los(&self, index: usize, date: Epoch) -> Vector3<f64>;

    /// Dual-number line of sight carrying partials with respect to the
    /// seed's selected parameters.
    fn los_dual(&self, index: usize, date: Epoch, seed: &DualSeed) -> DualVector3;
}

/// Builder assembling a [`CompositeLos`] from raw directions and a
/// transform pipeline.
pub struct LosBuilder {
    raw: Vec<Vector3<f64>>,
    transforms: Vec<Box<dyn LosTransform>>,
}

impl LosBuilder {
    /// Starts from the raw per-pixel directions (any length, normalized
    /// on evaluation).
    pub fn new(raw: Vec<Vector3<f64>>) -> Self {
        Self {
            raw,
            transforms: Vec::new(),
        }
    }

    /// Appends a transform to the pipeline.
    #[must_use]
    pub fn transform(mut self, transform: impl LosTransform + 'static) -> Self {
        self.transforms.push(Box::new(transform));
        self
    }

    /// Finishes the pipeline.
    pub fn build(self) -> CompositeLos {
        CompositeLos {
            raw: self.raw,
            transforms: self.transforms,
        }
    }
}

/// The reference [`LosProvider`]: raw directions pushed through the
/// transform pipeline, normalized at the end.
pub struct CompositeLos {
    raw: Vec<Vector3<f64>>,
    transforms: Vec<Box<dyn LosTransform>>,
}

impl CompositeLos {
    /// All parameter names exposed by the pipeline, in pipeline order.
    pub fn parameters(&self) -> Vec<String> {
        self.transforms.iter().flat_map(|t| t.parameters()).collect()
    }

    /// Value of a pipeline parameter.
    pub fn parameter(&self, name: &str) -> Option<f64> {
        self.transforms.iter().find_map(|t| t.parameter(name))
    }

    /// Updates a pipeline parameter; returns false when unknown.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        self.transforms
            .iter_mut()
            .any(|t| t.set_parameter(name, value))
    }
}

impl LosProvider for CompositeLos {
    fn pixel_count(&self) -> usize {
        self.raw.len()
    }

    fn los(&self, index: usize, date: Epoch) -> Vector3<f64> {
        let mut v = self.raw[index];
        for t in &self.transforms {
            v = t.transform(index, v, date);
        }
        v.normalize()
    }

    fn los_dual(&self, index: usize, date: Epoch, seed: &DualSeed) -> DualVector3 {
        let mut v = DualVector3::constant(&self.raw[index], seed);
        for t in &self.transforms {
            v = t.transform_dual(index, v, date, seed);
        }
        v.normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn pipeline_applies_transforms_in_order() {
        let los = LosBuilder::new(vec![Vector3::new(0.0, 0.0, 1.0)])
            .transform(FixedRotation::new("roll", Vector3::x(), FRAC_PI_2))
            .transform(FixedZHomothety::new("focal", 0.5))
            .build();
        // z -> -y under the roll, then z-scaling does nothing to -y
        let v = los.los(0, Epoch::REFERENCE);
        assert_relative_eq!(v.y, -1.0, epsilon = 1.0e-12);
        assert_relative_eq!(v.norm(), 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn polynomial_rotation_is_time_dependent() {
        let t0 = Epoch::REFERENCE;
        let los = LosBuilder::new(vec![Vector3::new(0.0, 0.0, 1.0)])
            .transform(PolynomialRotation::new(
                "thermal",
                Vector3::x(),
                t0,
                vec![0.0, 1.0e-3],
            ))
            .build();
        let v = los.los(0, t0 + 2.0);
        assert_relative_eq!(v.y, -(2.0e-3_f64).sin(), epsilon = 1.0e-12);
        assert_relative_eq!(los.los(0, t0).z, 1.0, epsilon = 1.0e-15);
    }

    #[test]
    fn dual_partials_match_finite_differences() {
        let pipeline = |angle: f64| {
            LosBuilder::new(vec![Vector3::new(0.1, 0.0, 1.0)])
                .transform(FixedRotation::new("roll", Vector3::x(), angle))
                .build()
        };
        let seed = DualSeed::new(["roll"]);
        let angle = 0.02;
        let dual = pipeline(angle).los_dual(0, Epoch::REFERENCE, &seed);
        let eps = 1.0e-7;
        let fd = (pipeline(angle + eps).los(0, Epoch::REFERENCE)
            - pipeline(angle - eps).los(0, Epoch::REFERENCE))
            / (2.0 * eps);
        let partial = dual.partial(0);
        assert_relative_eq!(partial.y, fd.y, max_relative = 1.0e-6);
        assert_relative_eq!(partial.z, fd.z, max_relative = 1.0e-6);
        assert_relative_eq!(dual.value().norm(), 1.0, epsilon = 1.0e-12);
    }

    #[test]
    fn parameters_are_named_and_settable() {
        let mut los = LosBuilder::new(vec![Vector3::z()])
            .transform(PolynomialRotation::new(
                "thermal",
                Vector3::x(),
                Epoch::REFERENCE,
                vec![0.1, 0.2],
            ))
            .transform(FixedZHomothety::new("focal", 1.0))
            .build();
        assert_eq!(los.parameters(), vec!["thermal[0]", "thermal[1]", "focal"]);
        assert!(los.set_parameter("thermal[1]", 0.5));
        assert_eq!(los.parameter("thermal[1]"), Some(0.5));
        assert!(!los.set_parameter("unknown", 1.0));
    }
}
