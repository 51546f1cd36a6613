use crate::C;
use std::f64::consts::PI;
use std::fmt;

/// Geodetic coordinates above a reference ellipsoid.
///
/// Latitude and longitude are in radians, altitude in meters. The struct
/// is deliberately frame-agnostic: which ellipsoid the altitude refers to
/// is the caller's business.
#[derive(Clone, Copy, PartialEq)]
pub struct GeodeticPoint {
    /// Geodetic latitude, radians.
    pub latitude: C,
    /// Longitude, radians.
    pub longitude: C,
    /// Altitude above the ellipsoid, meters.
    pub altitude: C,
}

impl GeodeticPoint {
    /// Builds a point from latitude and longitude in radians and an
    /// altitude in meters.
    pub fn new(latitude: C, longitude: C, altitude: C) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// Returns the same point with longitude shifted by a whole number of
    /// turns so that it falls within half a turn of `reference`.
    ///
    /// Tile walks near the antimeridian rely on this to keep longitudes
    /// continuous instead of jumping by 2π at the seam.
    #[must_use]
    pub fn normalized(self, reference: C) -> Self {
        Self {
            longitude: normalize_longitude(self.longitude, reference),
            ..self
        }
    }
}

impl fmt::Debug for GeodeticPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GeodeticPoint({:.9}, {:.9}, {:.3})",
            self.latitude, self.longitude, self.altitude
        )
    }
}

/// Shifts `longitude` by a whole number of turns into `reference ± π`.
pub fn normalize_longitude(longitude: C, reference: C) -> C {
    longitude - 2.0 * PI * ((longitude - reference) / (2.0 * PI)).round()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn normalization_brings_longitude_near_reference() {
        assert_relative_eq!(normalize_longitude(PI + 0.1, -PI), -PI + 0.1, epsilon = 1e-15);
        assert_relative_eq!(normalize_longitude(-0.2, 2.0 * PI), 2.0 * PI - 0.2, epsilon = 1e-12);
        let p = GeodeticPoint::new(0.3, 7.0, 125.0).normalized(0.0);
        assert_relative_eq!(p.longitude, 7.0 - 2.0 * PI, epsilon = 1e-15);
        assert_relative_eq!(p.latitude, 0.3);
    }
}
