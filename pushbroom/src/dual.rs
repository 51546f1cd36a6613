//! Hand-written forward-mode duals.
//!
//! Only the line-of-sight calibration path is differentiated, and only
//! with respect to a handful of selected parameters, so a small dual
//! number with a flat partials vector beats a general autodiff tape.

use nalgebra::Vector3;

/// Names of the parameters currently selected for differentiation. The
/// position of a name fixes its partial slot in every [`Dual`] built
/// against this seed.
#[derive(Clone, Debug, Default)]
pub struct DualSeed {
    names: Vec<String>,
}

impl DualSeed {
    /// A seed differentiating with respect to `names`, in order.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Number of partials carried by duals built on this seed.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// True when no parameter is selected.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Partial slot of a parameter name, if selected.
    pub fn slot(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Selected names in slot order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// A scalar carrying partial derivatives with respect to the seed's
/// selected parameters.
#[derive(Clone, Debug, PartialEq)]
pub struct Dual {
    value: f64,
    partials: Vec<f64>,
}

impl Dual {
    /// A constant: all partials zero.
    pub fn constant(value: f64, seed: &DualSeed) -> Self {
        Self {
            value,
            partials: vec![0.0; seed.len()],
        }
    }

    /// The variable sitting in `slot`: its own partial is one.
    pub fn variable(value: f64, slot: usize, seed: &DualSeed) -> Self {
        let mut partials = vec![0.0; seed.len()];
        partials[slot] = 1.0;
        Self { value, partials }
    }

    /// The scalar value.
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Partial derivative in `slot`.
    pub fn partial(&self, slot: usize) -> f64 {
        self.partials[slot]
    }

    fn zip(&self, other: &Dual, value: f64, da: f64, db: f64) -> Dual {
        Dual {
            value,
            partials: self
                .partials
                .iter()
                .zip(&other.partials)
                .map(|(a, b)| da * a + db * b)
                .collect(),
        }
    }

    fn map(&self, value: f64, derivative: f64) -> Dual {
        Dual {
            value,
            partials: self.partials.iter().map(|p| derivative * p).collect(),
        }
    }

    pub fn add(&self, other: &Dual) -> Dual {
        self.zip(other, self.value + other.value, 1.0, 1.0)
    }

    pub fn sub(&self, other: &Dual) -> Dual {
        self.zip(other, self.value - other.value, 1.0, -1.0)
    }

    pub fn mul(&self, other: &Dual) -> Dual {
        self.zip(other, self.value * other.value, other.value, self.value)
    }

    pub fn div(&self, other: &Dual) -> Dual {
        self.zip(
            other,
            self.value / other.value,
            1.0 / other.value,
            -self.value / (other.value * other.value),
        )
    }

    pub fn scale(&self, k: f64) -> Dual {
        self.map(self.value * k, k)
    }

    pub fn neg(&self) -> Dual {
        self.map(-self.value, -1.0)
    }

    pub fn sin(&self) -> Dual {
        self.map(self.value.sin(), self.value.cos())
    }

    pub fn cos(&self) -> Dual {
        self.map(self.value.cos(), -self.value.sin())
    }

    pub fn sqrt(&self) -> Dual {
        let root = self.value.sqrt();
        self.map(root, 0.5 / root)
    }
}

/// A 3-vector of duals, enough structure for line-of-sight pipelines.
#[derive(Clone, Debug)]
pub struct DualVector3 {
    pub x: Dual,
    pub y: Dual,
    pub z: Dual,
}

impl DualVector3 {
    /// Lifts a plain vector into dual space as a constant.
    pub fn constant(v: &Vector3<f64>, seed: &DualSeed) -> Self {
        Self {
            x: Dual::constant(v.x, seed),
            y: Dual::constant(v.y, seed),
            z: Dual::constant(v.z, seed),
        }
    }

    /// The plain value.
    pub fn value(&self) -> Vector3<f64> {
        Vector3::new(self.x.value(), self.y.value(), self.z.value())
    }

    /// Partial derivative of the vector in `slot`.
    pub fn partial(&self, slot: usize) -> Vector3<f64> {
        Vector3::new(
            self.x.partial(slot),
            self.y.partial(slot),
            self.z.partial(slot),
        )
    }

    pub fn dot(&self, other: &DualVector3) -> Dual {
        self.x
            .mul(&other.x)
            .add(&self.y.mul(&other.y))
            .add(&self.z.mul(&other.z))
    }

    pub fn scale(&self, k: &Dual) -> DualVector3 {
        DualVector3 {
            x: self.x.mul(k),
            y: self.y.mul(k),
            z: self.z.mul(k),
        }
    }

    pub fn add(&self, other: &DualVector3) -> DualVector3 {
        DualVector3 {
            x: self.x.add(&other.x),
            y: self.y.add(&other.y),
            z: self.z.add(&other.z),
        }
    }

    pub fn normalized(&self) -> DualVector3 {
        let norm = self.dot(self).sqrt();
        DualVector3 {
            x: self.x.div(&norm),
            y: self.y.div(&norm),
            z: self.z.div(&norm),
        }
    }

    /// Rodrigues rotation of the vector about a fixed axis by a dual
    /// angle.
    pub fn rotate_about(&self, axis: &Vector3<f64>, angle: &Dual, seed: &DualSeed) -> DualVector3 {
        let k = DualVector3::constant(axis, seed);
        let cos = angle.cos();
        let sin = angle.sin();
        let k_cross_v = DualVector3 {
            x: k.y.mul(&self.z).sub(&k.z.mul(&self.y)),
            y: k.z.mul(&self.x).sub(&k.x.mul(&self.z)),
            z: k.x.mul(&self.y).sub(&k.y.mul(&self.x)),
        };
        let k_dot_v = k.dot(self);
        let one_minus_cos = Dual::constant(1.0, seed).sub(&cos);
        self.scale(&cos)
            .add(&k_cross_v.scale(&sin))
            .add(&k.scale(&k_dot_v.mul(&one_minus_cos)))
    }
}
