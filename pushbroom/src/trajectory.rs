use crate::{
    epoch::Epoch,
    hermite::Interpolator,
    transform::Transform,
    PushbroomError,
};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use std::collections::{HashMap, VecDeque};

/// Source of the three frame transforms the engine needs.
///
/// The engine treats the provider as a plug-in: anything able to answer
/// these queries (a celestial-mechanics library adapter, a sampled
/// trajectory, a test stub) fits. Methods take `&mut self` because
/// reasonable implementations memoize.
pub trait TransformProvider {
    /// Spacecraft frame to inertial frame at `date`.
    fn sc_to_inertial(&mut self, date: Epoch) -> Result<Transform, PushbroomError>;

    /// Inertial frame to body-fixed frame at `date`.
    fn inertial_to_body(&mut self, date: Epoch) -> Result<Transform, PushbroomError>;

    /// Body-fixed frame to inertial frame at `date`.
    fn body_to_inertial(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        Ok(self.inertial_to_body(date)?.inverse())
    }
}

/// One position/velocity sample of the spacecraft in the inertial frame.
#[derive(Clone, Copy, Debug)]
pub struct PvSample {
    pub date: Epoch,
    /// Position, meters, inertial frame.
    pub position: Vector3<f64>,
    /// Velocity, meters per second, inertial frame.
    pub velocity: Vector3<f64>,
}

/// One attitude sample: the rotation taking spacecraft-frame coordinates
/// to inertial-frame coordinates.
#[derive(Clone, Copy, Debug)]
pub struct AttitudeSample {
    pub date: Epoch,
    pub rotation: UnitQuaternion<f64>,
}

/// Uniform rotation of the body around its polar axis.
///
/// Earth-orientation subtleties (precession, nutation, polar motion) are
/// the business of the caller's frame library; a provider built on one
/// replaces this model wholesale.
#[derive(Clone, Copy, Debug)]
pub struct BodyRotation {
    /// Rotation rate, radians per second.
    pub rate: f64,
    /// Rotation angle at `reference_date`, radians.
    pub reference_angle: f64,
    pub reference_date: Epoch,
}

impl BodyRotation {
    /// Earth's sidereal rotation, zero meridian angle at the reference.
    pub fn earth(reference_date: Epoch) -> Self {
        Self {
            rate: 7.292_115_146_706_979e-5,
            reference_angle: 0.0,
            reference_date,
        }
    }

    /// A body that does not rotate: inertial and body frames coincide.
    /// Handy for tests that want geometry without Earth rotation.
    pub fn frozen(reference_date: Epoch) -> Self {
        Self {
            rate: 0.0,
            reference_angle: 0.0,
            reference_date,
        }
    }
}

/// Interpolation and memoization settings of [`SampledTrajectory`].
#[derive(Clone, Copy, Debug)]
pub struct InterpolationConfig {
    /// Position/velocity samples per Hermite window.
    pub pv_samples: usize,
    /// Attitude samples per interpolation window.
    pub attitude_samples: usize,
    /// Quantization step of the transform memo, seconds.
    pub time_step: f64,
    /// Bound on memoized transforms per kind.
    pub memo_capacity: usize,
    /// Tolerated overshoot outside the sample span, seconds.
    pub overshoot_tolerance: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            pv_samples: 8,
            attitude_samples: 2,
            time_step: 1.0e-3,
            memo_capacity: 4096,
            overshoot_tolerance: 0.01,
        }
    }
}

/// Reference [`TransformProvider`] built from tabulated spacecraft
/// position/velocity and attitude, plus a uniform body rotation.
///
/// Transforms are interpolated once per quantized date and memoized;
/// sub-step dates are served by shifting the memoized transform, so a
/// whole sensor line hitting the same date costs one interpolation.
/// The memo hit rate is the single most important performance knob of
/// direct location.
pub struct SampledTrajectory {
    pv: Vec<PvSample>,
    attitude: Vec<AttitudeSample>,
    body: BodyRotation,
    config: InterpolationConfig,
    min_date: Epoch,
    max_date: Epoch,
    sc_memo: Memo,
    body_memo: Memo,
}

struct Memo {
    transforms: HashMap<i64, Transform>,
    order: VecDeque<i64>,
    capacity: usize,
}

impl Memo {
    fn new(capacity: usize) -> Self {
        Self {
            transforms: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, tick: i64) -> Option<Transform> {
        self.transforms.get(&tick).copied()
    }

    fn insert(&mut self, tick: i64, transform: Transform) {
        self.transforms.insert(tick, transform);
        self.order.push_back(tick);
        if self.order.len() > self.capacity {
            if let Some(old) = self.order.pop_front() {
                self.transforms.remove(&old);
            }
        }
    }
}

impl SampledTrajectory {
    /// Builds a provider from date-ordered samples. Requires at least
    /// two position/velocity samples and one attitude sample, with
    /// overlapping spans.
    pub fn new(
        pv: Vec<PvSample>,
        attitude: Vec<AttitudeSample>,
        body: BodyRotation,
        config: InterpolationConfig,
    ) -> Result<Self, PushbroomError> {
        if pv.len() < 2 || attitude.is_empty() {
            return Err(PushbroomError::Internal("not enough trajectory samples"));
        }
        if pv.windows(2).any(|w| w[1].date <= w[0].date)
            || attitude.windows(2).any(|w| w[1].date <= w[0].date)
        {
            return Err(PushbroomError::Internal("trajectory samples out of order"));
        }
        let first = pv[0].date.max(attitude[0].date);
        let last = pv[pv.len() - 1]
            .date
            .min(attitude[attitude.len() - 1].date);
        if last <= first {
            return Err(PushbroomError::Internal(
                "position and attitude spans do not overlap",
            ));
        }
        Ok(Self {
            pv,
            attitude,
            body,
            config,
            min_date: first,
            max_date: last,
            sc_memo: Memo::new(config.memo_capacity),
            body_memo: Memo::new(config.memo_capacity),
        })
    }

    /// First date servable without overshoot.
    pub fn min_date(&self) -> Epoch {
        self.min_date
    }

    /// Last date servable without overshoot.
    pub fn max_date(&self) -> Epoch {
        self.max_date
    }

    fn check_span(&self, date: Epoch) -> Result<(), PushbroomError> {
        let tol = self.config.overshoot_tolerance;
        if date - self.min_date < -tol || date - self.max_date > tol {
            return Err(PushbroomError::OutOfTimeRange(date));
        }
        Ok(())
    }

    fn tick(&self, date: Epoch) -> i64 {
        ((date - self.min_date) / self.config.time_step).round() as i64
    }

    fn tick_date(&self, tick: i64) -> Epoch {
        self.min_date + tick as f64 * self.config.time_step
    }

    /// Centered index window of `count` samples around `date`.
    fn window(len: usize, count: usize, position: usize) -> (usize, usize) {
        let count = count.clamp(1, len);
        let half = count / 2;
        let start = position.saturating_sub(half).min(len - count);
        (start, start + count)
    }

    fn interpolate_pv(&self, date: Epoch) -> (Vector3<f64>, Vector3<f64>) {
        let t = date - self.min_date;
        let position = self
            .pv
            .partition_point(|s| s.date - self.min_date <= t)
            .saturating_sub(1);
        let (start, end) = Self::window(self.pv.len(), self.config.pv_samples, position);
        let samples: Vec<(f64, [f64; 3], Option<[f64; 3]>)> = self.pv[start..end]
            .iter()
            .map(|s| {
                (
                    s.date - self.min_date,
                    [s.position.x, s.position.y, s.position.z],
                    Some([s.velocity.x, s.velocity.y, s.velocity.z]),
                )
            })
            .collect();
        let (p, v) = Interpolator::new(&samples).value_and_derivative(t);
        (Vector3::from(p), Vector3::from(v))
    }

    fn interpolate_attitude(&self, date: Epoch) -> (UnitQuaternion<f64>, Vector3<f64>) {
        if self.attitude.len() == 1 {
            return (self.attitude[0].rotation, Vector3::zeros());
        }
        let t = date - self.min_date;
        let position = self
            .attitude
            .partition_point(|s| s.date - self.min_date <= t)
            .saturating_sub(1);
        let (start, end) =
            Self::window(self.attitude.len(), self.config.attitude_samples, position);

        // interpolate the four components with sign continuity, then
        // project back on the unit sphere
        let mut previous: Option<Quaternion<f64>> = None;
        let samples: Vec<(f64, [f64; 4], Option<[f64; 4]>)> = self.attitude[start..end]
            .iter()
            .map(|s| {
                let mut q = *s.rotation.quaternion();
                if let Some(p) = previous {
                    if p.dot(&q) < 0.0 {
                        q = -q;
                    }
                }
                previous = Some(q);
                let v = q.imag();
                (s.date - self.min_date, [q.scalar(), v.x, v.y, v.z], None)
            })
            .collect();
        let (q, dq) = Interpolator::new(&samples).value_and_derivative(t);
        let raw = Quaternion::new(q[0], q[1], q[2], q[3]);
        let raw_dot = Quaternion::new(dq[0], dq[1], dq[2], dq[3]);
        let norm = raw.norm();
        let unit = UnitQuaternion::from_quaternion(raw);
        // derivative of the normalized quaternion
        let radial = raw.dot(&raw_dot) / (norm * norm);
        let unit_dot = (raw_dot - raw * radial) * (1.0 / norm);
        // angular velocity in the destination frame: ω = 2 q̇ q*
        let spin_q = unit_dot * unit.quaternion().conjugate();
        (unit, 2.0 * spin_q.imag())
    }

    fn raw_sc_to_inertial(&self, date: Epoch) -> Transform {
        let (position, velocity) = self.interpolate_pv(date);
        let (rotation, spin) = self.interpolate_attitude(date);
        Transform::new(date, position, velocity, rotation, spin)
    }

    fn raw_inertial_to_body(&self, date: Epoch) -> Transform {
        let theta =
            self.body.reference_angle + self.body.rate * (date - self.body.reference_date);
        Transform::new(
            date,
            Vector3::zeros(),
            Vector3::zeros(),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -theta),
            Vector3::new(0.0, 0.0, -self.body.rate),
        )
    }
}

impl TransformProvider for SampledTrajectory {
    fn sc_to_inertial(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        self.check_span(date)?;
        let tick = self.tick(date);
        let tick_date = self.tick_date(tick);
        let cached = match self.sc_memo.get(tick) {
            Some(t) => t,
            None => {
                let t = self.raw_sc_to_inertial(tick_date);
                self.sc_memo.insert(tick, t);
                t
            }
        };
        Ok(cached.shifted_by(date - tick_date))
    }

    fn inertial_to_body(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        self.check_span(date)?;
        let tick = self.tick(date);
        let tick_date = self.tick_date(tick);
        let cached = match self.body_memo.get(tick) {
            Some(t) => t,
            None => {
                let t = self.raw_inertial_to_body(tick_date);
                self.body_memo.insert(tick, t);
                t
            }
        };
        Ok(cached.shifted_by(date - tick_date))
    }
}
