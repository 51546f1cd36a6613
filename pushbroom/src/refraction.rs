//! Atmospheric refraction as a correction-grid fixed point.
//!
//! The refraction model itself is a plug-in: anything able to bend a
//! body-frame line of sight and move a raw DEM intersection to its
//! refracted ground point. Inverse location with refraction does not
//! invert the model; it builds, once per sensor and line range, a sparse
//! grid of (pixel, line) corrections from direct/inverse round trips and
//! then iterates a fixed point over the bilinearly interpolated grid.

use crate::{
    ellipsoid::Ellipsoid, intersection::IntersectionAlgorithm, sensor::SensorPixel,
    PushbroomError,
};
use demgrid::GeodeticPoint;
use nalgebra::Vector3;

/// Convergence threshold of the inverse fixed point, pixels.
pub(crate) const INVERSE_TOLERANCE: f64 = 1.0e-4;

/// Iteration bound of the inverse fixed point.
pub(crate) const MAX_FIXED_POINT_STEPS: usize = 50;

/// A physical refraction model applied around the intersector.
pub trait RefractionModel {
    /// Moves the raw (unrefracted) DEM intersection to the ground point
    /// actually seen through the atmosphere, for a satellite at
    /// `position` looking along `los`, both in the body frame.
    fn apply(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        raw: &GeodeticPoint,
        algorithm: &mut dyn IntersectionAlgorithm,
        ellipsoid: &Ellipsoid,
    ) -> Result<GeodeticPoint, PushbroomError>;
}

/// Sparse grid of inverse-location corrections over the sensor raster.
///
/// Correction = (true sensor coordinates) − (coordinates recomputed by
/// refraction-less inverse location of the refracted ground point), so
/// that `sp = sp₀ + correction(sp)` is a fixed point of the refracted
/// inverse problem. Interpolation is bilinear and clamped at the grid
/// hull: queries beyond the sampled sensor domain reuse the edge values.
pub struct CorrectionGrid {
    pixel_axis: Vec<f64>,
    line_axis: Vec<f64>,
    // row-major [line][pixel]
    pixel_corrections: Vec<f64>,
    line_corrections: Vec<f64>,
}

impl CorrectionGrid {
    pub(crate) fn new(
        pixel_axis: Vec<f64>,
        line_axis: Vec<f64>,
        pixel_corrections: Vec<f64>,
        line_corrections: Vec<f64>,
    ) -> Result<Self, PushbroomError> {
        if pixel_axis.len() < 2
            || line_axis.len() < 2
            || pixel_corrections.len() != pixel_axis.len() * line_axis.len()
            || line_corrections.len() != pixel_corrections.len()
        {
            return Err(PushbroomError::Internal("malformed correction grid"));
        }
        Ok(Self {
            pixel_axis,
            line_axis,
            pixel_corrections,
            line_corrections,
        })
    }

    /// Clamped bracketing interval and interpolation weight on one axis.
    fn locate(axis: &[f64], x: f64) -> (usize, f64) {
        let i = axis.partition_point(|&a| a <= x);
        let i = i.clamp(1, axis.len() - 1) - 1;
        let width = axis[i + 1] - axis[i];
        let w = ((x - axis[i]) / width).clamp(0.0, 1.0);
        (i, w)
    }

    /// Interpolated `(pixel, line)` correction at a sensor coordinate.
    pub fn correction(&self, pixel: f64, line: f64) -> (f64, f64) {
        let (i, wx) = Self::locate(&self.pixel_axis, pixel);
        let (j, wy) = Self::locate(&self.line_axis, line);
        let cols = self.pixel_axis.len();
        let blend = |table: &[f64]| {
            table[j * cols + i] * (1.0 - wx) * (1.0 - wy)
                + table[j * cols + i + 1] * wx * (1.0 - wy)
                + table[(j + 1) * cols + i] * (1.0 - wx) * wy
                + table[(j + 1) * cols + i + 1] * wx * wy
        };
        (
            blend(&self.pixel_corrections),
            blend(&self.line_corrections),
        )
    }

    /// Runs the inverse-location fixed point from a refraction-less
    /// solution `sp0`.
    pub(crate) fn fixed_point(&self, sp0: SensorPixel) -> Result<SensorPixel, PushbroomError> {
        let mut current = sp0;
        for _ in 0..MAX_FIXED_POINT_STEPS {
            let (dp, dl) = self.correction(current.pixel, current.line);
            let next = SensorPixel {
                line: sp0.line + dl,
                pixel: sp0.pixel + dp,
            };
            if (next.line - current.line).abs() < INVERSE_TOLERANCE
                && (next.pixel - current.pixel).abs() < INVERSE_TOLERANCE
            {
                return Ok(next);
            }
            current = next;
        }
        Err(PushbroomError::SolverFailed(MAX_FIXED_POINT_STEPS))
    }
}
