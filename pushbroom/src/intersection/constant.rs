//! Ellipsoid-only intersection, ignoring the DEM.

use super::IntersectionAlgorithm;
use crate::{ellipsoid::Ellipsoid, PushbroomError};
use demgrid::GeodeticPoint;
use nalgebra::Vector3;

/// Intersects rays with the ellipsoid offset to a constant elevation.
///
/// Used by configurations without elevation data and as a debugging
/// reference: with elevation zero this is the plain ray/ellipsoid
/// intersection.
pub struct ConstantElevationAlgorithm {
    elevation: f64,
}

impl ConstantElevationAlgorithm {
    pub fn new(elevation: f64) -> Self {
        Self { elevation }
    }
}

impl IntersectionAlgorithm for ConstantElevationAlgorithm {
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<GeodeticPoint, PushbroomError> {
        ellipsoid.point_on_ground(position, los, self.elevation, 0.0)
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        guess: &GeodeticPoint,
    ) -> Result<GeodeticPoint, PushbroomError> {
        ellipsoid.point_on_ground(position, los, self.elevation, guess.longitude)
    }

    fn elevation(&mut self, _latitude: f64, _longitude: f64) -> Result<f64, PushbroomError> {
        Ok(self.elevation)
    }
}
