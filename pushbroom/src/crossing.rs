//! Inverse-location solvers: which line, then which pixel, sees a
//! ground target.

use crate::{
    correction::{apparent_los, SPEED_OF_LIGHT},
    epoch::Epoch,
    sensor::{LineSensor, SensorPixel},
    trajectory::TransformProvider,
    PushbroomError,
};
use log::trace;
use nalgebra::{Matrix3, Vector3};
use std::f64::consts::FRAC_PI_2;

/// Outcome of the mean-plane crossing search: the line whose swept plane
/// contains the target, with the target direction and its derivative
/// with respect to the line number as a first-order Taylor expansion for
/// cheap downstream refinement.
#[derive(Clone, Copy, Debug)]
pub struct CrossingResult {
    /// Crossing line number.
    pub line: f64,
    /// Acquisition date of the crossing line.
    pub date: Epoch,
    /// Unit direction from sensor to target, spacecraft frame.
    pub target_direction: Vector3<f64>,
    /// Derivative of the direction with respect to the line number.
    pub target_direction_derivative: Vector3<f64>,
}

struct Evaluation {
    date: Epoch,
    /// β - π/2 where β is the angle between target direction and the
    /// mean-plane normal. Zero exactly at the crossing.
    offset: f64,
    /// d(offset)/d(line).
    offset_derivative: f64,
    direction: Vector3<f64>,
    direction_derivative: Vector3<f64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SolverState {
    Init,
    Bracketing,
    Newton,
    Converged,
    Failed,
}

/// Finds the sensor line seeing a ground target by solving the scalar
/// mean-plane crossing equation in time.
///
/// The sensor's pixels sweep a plane through space as the spacecraft
/// moves; the crossing of the target with that plane is found by a
/// derivative-aware Newton iteration on the line number, falling back to
/// bracketed bisection when Newton stops making progress. The previous
/// result seeds the next search, which makes inverse location over a
/// neighborhood of ground points nearly free after the first.
pub struct MeanPlaneCrossing {
    min_line: f64,
    max_line: f64,
    mid_line: f64,
    normal: Vector3<f64>,
    accuracy: f64,
    max_evaluations: usize,
    light_time: bool,
    aberration: bool,
    cached_line: Option<f64>,
}

impl MeanPlaneCrossing {
    /// Builds the solver for one sensor and line range, computing the
    /// mean plane of the pixel fan at the mid-range date.
    pub fn new(
        sensor: &LineSensor,
        min_line: f64,
        max_line: f64,
        light_time: bool,
        aberration: bool,
        accuracy: f64,
        max_evaluations: usize,
    ) -> Result<Self, PushbroomError> {
        if !(max_line > min_line) {
            return Err(PushbroomError::Internal("empty line range"));
        }
        let mid_line = 0.5 * (min_line + max_line);
        let mid_date = sensor.date(mid_line);
        let count = sensor.pixel_count();
        if count < 2 {
            return Err(PushbroomError::Internal("sensor with fewer than 2 pixels"));
        }

        // best-fit plane through the pixel directions: the normal is the
        // least-significant eigenvector of the moment matrix
        let mut moment = Matrix3::zeros();
        for i in 0..count {
            let l = sensor.los(i, mid_date);
            moment += l * l.transpose();
        }
        let eigen = moment.symmetric_eigen();
        let mut smallest = 0;
        for k in 1..3 {
            if eigen.eigenvalues[k] < eigen.eigenvalues[smallest] {
                smallest = k;
            }
        }
        let mut normal = eigen.eigenvectors.column(smallest).into_owned();
        normal.normalize_mut();
        // orient along increasing pixel numbers
        let chord = sensor.los(0, mid_date).cross(&sensor.los(count - 1, mid_date));
        if normal.dot(&chord) < 0.0 {
            normal = -normal;
        }

        Ok(Self {
            min_line,
            max_line,
            mid_line,
            normal,
            accuracy,
            max_evaluations,
            light_time,
            aberration,
            cached_line: None,
        })
    }

    /// The mean-plane unit normal, spacecraft frame.
    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    /// The crossing line for a body-frame Cartesian target, or `None`
    /// when the target is not seen within the line range.
    pub fn find(
        &mut self,
        target: &Vector3<f64>,
        sensor: &LineSensor,
        provider: &mut dyn TransformProvider,
    ) -> Result<Option<CrossingResult>, PushbroomError> {
        let mut line = self
            .cached_line
            .unwrap_or(self.mid_line)
            .clamp(self.min_line, self.max_line);
        let mut state = SolverState::Init;
        let mut evaluations = 0;
        let mut newton_steps = 0;
        let mut last_magnitude = f64::INFINITY;
        // bracket endpoints, by sign of the offset
        let mut negative: Option<f64> = None;
        let mut positive: Option<f64> = None;
        let mut probed_min = false;
        let mut probed_max = false;

        while evaluations < self.max_evaluations {
            let eval = self.evaluate(line, target, sensor, provider)?;
            evaluations += 1;
            if eval.offset < 0.0 {
                negative = Some(line);
            } else {
                positive = Some(line);
            }
            probed_min |= line == self.min_line;
            probed_max |= line == self.max_line;

            let newton_step = -eval.offset / eval.offset_derivative;
            if newton_step.is_finite() && newton_step.abs() <= self.accuracy {
                state = SolverState::Converged;
                let line = (line + newton_step).clamp(self.min_line, self.max_line);
                let last = self.evaluate(line, target, sensor, provider)?;
                trace!(
                    "mean-plane crossing converged at line {line:.4} after {evaluations} evaluations ({state:?})",
                );
                self.cached_line = Some(line);
                return Ok(Some(CrossingResult {
                    line,
                    date: last.date,
                    target_direction: last.direction,
                    target_direction_derivative: last.direction_derivative,
                }));
            }

            state = match state {
                SolverState::Init => SolverState::Newton,
                SolverState::Newton => {
                    newton_steps += 1;
                    // a Newton sequence that stops shrinking the offset
                    // is circling a bad derivative: bracket instead
                    if newton_steps > 5 && eval.offset.abs() >= last_magnitude {
                        SolverState::Bracketing
                    } else {
                        SolverState::Newton
                    }
                }
                other => other,
            };
            last_magnitude = eval.offset.abs();

            if state == SolverState::Newton && newton_step.is_finite() {
                let next = (line + newton_step).clamp(self.min_line, self.max_line);
                if next != line {
                    line = next;
                    continue;
                }
                // pinned on a bound: fall through to bracketing
                state = SolverState::Bracketing;
            } else if state == SolverState::Newton {
                state = SolverState::Bracketing;
            }

            // bracketed bisection
            if let (Some(lo), Some(hi)) = (negative, positive) {
                if (hi - lo).abs() <= self.accuracy {
                    // the bracket collapsed: good enough, finish here
                    let line = 0.5 * (lo + hi);
                    let last = self.evaluate(line, target, sensor, provider)?;
                    self.cached_line = Some(line);
                    return Ok(Some(CrossingResult {
                        line,
                        date: last.date,
                        target_direction: last.direction,
                        target_direction_derivative: last.direction_derivative,
                    }));
                }
                line = 0.5 * (lo + hi);
            } else if !probed_min {
                line = self.min_line;
            } else if !probed_max {
                line = self.max_line;
            } else {
                // both ends and the iterates agree on the sign: the
                // target never crosses the plane within the range
                state = SolverState::Failed;
                trace!("mean-plane crossing found no sign change ({state:?})");
                self.cached_line = None;
                return Ok(None);
            }
        }
        Err(PushbroomError::SolverFailed(self.max_evaluations))
    }

    /// The crossing function and its derivative at one line.
    fn evaluate(
        &self,
        line: f64,
        target: &Vector3<f64>,
        sensor: &LineSensor,
        provider: &mut dyn TransformProvider,
    ) -> Result<Evaluation, PushbroomError> {
        let date = sensor.date(line);
        let sc_to_inertial = provider.sc_to_inertial(date)?;
        let body_to_inertial = provider.body_to_inertial(date)?;

        let sensor_position = sensor.position();
        let position_inertial = sc_to_inertial.position(&sensor_position);
        let velocity_inertial = sc_to_inertial.velocity_of(&sensor_position, &Vector3::zeros());

        // target state in the inertial frame, light time compensated
        let body_transform = if self.light_time {
            let once = body_to_inertial.position(target);
            let delay = (once - position_inertial).norm() / SPEED_OF_LIGHT;
            body_to_inertial.shifted_by(-delay)
        } else {
            body_to_inertial
        };
        let target_inertial = body_transform.position(target);
        let target_velocity = body_transform.velocity_of(target, &Vector3::zeros());

        let mut direction = target_inertial - position_inertial;
        let mut direction_dot = target_velocity - velocity_inertial;

        if self.aberration {
            // the sensor observes the velocity-aberrated direction
            let norm = direction.norm();
            let unit = direction / norm;
            let unit_dot = (direction_dot - unit * unit.dot(&direction_dot)) / norm;
            direction = SPEED_OF_LIGHT * unit + velocity_inertial;
            direction_dot = SPEED_OF_LIGHT * unit_dot;
            debug_assert!(
                (apparent_los(&unit, &velocity_inertial) - direction.normalize()).norm() < 1.0e-12
            );
        }

        // express in the spacecraft frame
        let q = sc_to_inertial.rotation();
        let w = sc_to_inertial.spin();
        let d_sc = q.inverse_transform_vector(&direction);
        let d_sc_dot = q.inverse_transform_vector(&(direction_dot - w.cross(&direction)));

        // normalize, then chain d/dt into d/dline
        let norm = d_sc.norm();
        let unit = d_sc / norm;
        let unit_dot = (d_sc_dot - unit * unit.dot(&d_sc_dot)) / norm;
        let rate = sensor.rate(line);
        let direction_derivative = unit_dot / rate;

        let cos_beta = self.normal.dot(&unit).clamp(-1.0, 1.0);
        let sin_beta = (1.0 - cos_beta * cos_beta).sqrt().max(1.0e-15);
        let offset = cos_beta.acos() - FRAC_PI_2;
        let offset_derivative = -self.normal.dot(&direction_derivative) / sin_beta;

        Ok(Evaluation {
            date,
            offset,
            offset_derivative,
            direction: unit,
            direction_derivative,
        })
    }
}

/// Locates the pixel along the crossing line whose line of sight matches
/// the target direction, by bracketing the root of the in-plane angular
/// offset over the pixel range.
pub fn locate_pixel(
    sensor: &LineSensor,
    normal: &Vector3<f64>,
    crossing: &CrossingResult,
    accuracy: f64,
    max_evaluations: usize,
) -> Option<f64> {
    let cross = normal.cross(&crossing.target_direction).normalize();
    let g = |x: f64| interpolated_los(sensor, crossing.date, x).dot(&cross);
    let hi = sensor.pixel_count() as f64;
    brent(g, -1.0, hi, accuracy, max_evaluations)
}

/// Line of sight at a fractional (possibly slightly out-of-range) pixel
/// coordinate, linearly interpolated between the bracketing pixels.
fn interpolated_los(sensor: &LineSensor, date: Epoch, x: f64) -> Vector3<f64> {
    let count = sensor.pixel_count();
    let i = (x.floor() as isize).clamp(0, count as isize - 2) as usize;
    let f = x - i as f64;
    ((1.0 - f) * sensor.los(i, date) + f * sensor.los(i + 1, date)).normalize()
}

/// Refines the crossing into a final (line, pixel) pair.
///
/// The bracketing pixels' exact lines of sight may sit slightly off the
/// mean plane; the line is adjusted from the angle between the target
/// direction and the local Z axis of the pixel pair, and the pixel is
/// recomputed by atan2 in the (X, Y) plane of the corrected local frame.
pub fn refine_pixel(
    sensor: &LineSensor,
    crossing: &CrossingResult,
    coarse_pixel: f64,
) -> Option<SensorPixel> {
    let count = sensor.pixel_count();
    let low = (coarse_pixel.floor() as isize).clamp(0, count as isize - 2) as usize;
    let low_los = sensor.los(low, crossing.date);
    let high_los = sensor.los(low + 1, crossing.date);
    let local_z = low_los.cross(&high_los).normalize();

    let cos_beta = crossing.target_direction.dot(&local_z).clamp(-1.0, 1.0);
    let beta = cos_beta.acos();
    let s = crossing.target_direction_derivative.dot(&local_z);
    let beta_derivative = -s / (1.0 - cos_beta * cos_beta).sqrt();
    let delta_line = if beta_derivative.abs() > 1.0e-15 {
        (FRAC_PI_2 - beta) / beta_derivative
    } else {
        0.0
    };
    if !delta_line.is_finite() {
        return None;
    }

    let fixed_line = crossing.line + delta_line;
    let fixed_direction =
        (crossing.target_direction + delta_line * crossing.target_direction_derivative).normalize();
    let fixed_date = sensor.date(fixed_line);

    let fixed_x = sensor.los(low, fixed_date);
    let fixed_high = sensor.los(low + 1, fixed_date);
    let fixed_z = fixed_x.cross(&fixed_high);
    let fixed_y = fixed_z.cross(&fixed_x).normalize();

    let pixel_width = fixed_high.dot(&fixed_y).atan2(fixed_high.dot(&fixed_x));
    let alpha = fixed_direction.dot(&fixed_y).atan2(fixed_direction.dot(&fixed_x));
    Some(SensorPixel {
        line: fixed_line,
        pixel: low as f64 + alpha / pixel_width,
    })
}

/// Bracketing Brent root finder over `[a, b]`; `None` when the root is
/// not bracketed or the budget runs out.
fn brent(f: impl Fn(f64) -> f64, a: f64, b: f64, tol: f64, max_evaluations: usize) -> Option<f64> {
    let mut a = a;
    let mut b = b;
    let mut fa = f(a);
    let mut fb = f(b);
    if fa * fb > 0.0 {
        return None;
    }
    if fa.abs() < fb.abs() {
        std::mem::swap(&mut a, &mut b);
        std::mem::swap(&mut fa, &mut fb);
    }
    let mut c = a;
    let mut fc = fa;
    let mut d = b - a;
    let mut bisected = true;
    for _ in 0..max_evaluations {
        if fb == 0.0 || (b - a).abs() < tol {
            return Some(b);
        }
        let s = if fa != fc && fb != fc {
            // inverse quadratic interpolation
            a * fb * fc / ((fa - fb) * (fa - fc))
                + b * fa * fc / ((fb - fa) * (fb - fc))
                + c * fa * fb / ((fc - fa) * (fc - fb))
        } else {
            // secant
            b - fb * (b - a) / (fb - fa)
        };
        let mid = 0.5 * (a + b);
        let use_bisection = !(s.min(b) > mid.min(b) && s.max(b) < mid.max(b))
            && (s - b).abs() >= (if bisected { (b - c).abs() } else { d.abs() }) * 0.5;
        let s = if use_bisection { mid } else { s };
        bisected = use_bisection;
        d = c - b;
        c = b;
        fc = fb;
        let fs = f(s);
        if fa * fs < 0.0 {
            b = s;
            fb = fs;
        } else {
            a = s;
            fa = fs;
        }
        if fa.abs() < fb.abs() {
            std::mem::swap(&mut a, &mut b);
            std::mem::swap(&mut fa, &mut fb);
        }
    }
    None
}
