use crate::PushbroomError;
use demgrid::{normalize_longitude, GeodeticPoint};
use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_2;

/// An oblate ellipsoid of revolution with geodetic conversions and the
/// ray intersections the DEM walkers are built on.
///
/// All Cartesian coordinates are in the body-fixed frame: origin at the
/// center, z along the rotation axis, x through the zero meridian.
#[derive(Clone, Copy, Debug)]
pub struct Ellipsoid {
    a: f64,
    f: f64,
    b: f64,
    e2: f64,
}

impl Ellipsoid {
    /// An ellipsoid from its equatorial radius (meters) and flattening.
    pub fn new(equatorial_radius: f64, flattening: f64) -> Self {
        Self {
            a: equatorial_radius,
            f: flattening,
            b: equatorial_radius * (1.0 - flattening),
            e2: flattening * (2.0 - flattening),
        }
    }

    /// The WGS84 reference ellipsoid.
    pub fn wgs84() -> Self {
        Self::new(6_378_137.0, 1.0 / 298.257_223_563)
    }

    /// Equatorial radius, meters.
    pub fn equatorial_radius(&self) -> f64 {
        self.a
    }

    /// Polar radius, meters.
    pub fn polar_radius(&self) -> f64 {
        self.b
    }

    /// Flattening.
    pub fn flattening(&self) -> f64 {
        self.f
    }

    /// Radius of curvature in the prime vertical.
    fn prime_vertical_radius(&self, sin_lat: f64) -> f64 {
        self.a / (1.0 - self.e2 * sin_lat * sin_lat).sqrt()
    }

    /// Geodetic to Cartesian, closed form.
    pub fn cartesian(&self, point: &GeodeticPoint) -> Vector3<f64> {
        let (sin_lat, cos_lat) = point.latitude.sin_cos();
        let (sin_lon, cos_lon) = point.longitude.sin_cos();
        let n = self.prime_vertical_radius(sin_lat);
        Vector3::new(
            (n + point.altitude) * cos_lat * cos_lon,
            (n + point.altitude) * cos_lat * sin_lon,
            (n * (1.0 - self.e2) + point.altitude) * sin_lat,
        )
    }

    /// Cartesian to geodetic, by fixed-point iteration on the latitude.
    ///
    /// Converges in a handful of iterations for any point from the
    /// surface up to (and well beyond) orbital altitudes.
    pub fn geodetic(&self, point: &Vector3<f64>) -> GeodeticPoint {
        let r = point.x.hypot(point.y);
        if r < 1.0e-6 {
            // polar axis: longitude is arbitrary, keep zero
            let altitude = point.z.abs() - self.b;
            return GeodeticPoint::new(FRAC_PI_2.copysign(point.z), 0.0, altitude);
        }
        let longitude = point.y.atan2(point.x);
        let mut latitude = point.z.atan2(r * (1.0 - self.e2));
        for _ in 0..12 {
            let n = self.prime_vertical_radius(latitude.sin());
            let next = (point.z + self.e2 * n * latitude.sin()).atan2(r);
            let done = (next - latitude).abs() < 1.0e-15;
            latitude = next;
            if done {
                break;
            }
        }
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let n = self.prime_vertical_radius(sin_lat);
        let altitude = if cos_lat.abs() > 1.0e-8 {
            r / cos_lat - n
        } else {
            point.z / sin_lat - n * (1.0 - self.e2)
        };
        GeodeticPoint::new(latitude, longitude, altitude)
    }

    /// Cartesian to geodetic with the longitude normalized near
    /// `longitude_reference`, so tile walks never wrap at ±π.
    pub fn geodetic_near(&self, point: &Vector3<f64>, longitude_reference: f64) -> GeodeticPoint {
        self.geodetic(point).normalized(longitude_reference)
    }

    /// Intersection of the ray `position + k·los` with the ellipsoid
    /// inflated by `altitude`, picking the root closest to `position`.
    ///
    /// The inflated surface uses semi-axes `a + h` and `b + h`, which is
    /// not exactly the constant-altitude surface but is within the
    /// flattening-squared error the search loops tolerate.
    pub fn point_at_altitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        altitude: f64,
    ) -> Result<Vector3<f64>, PushbroomError> {
        let ae2 = (self.a + altitude) * (self.a + altitude);
        let ap2 = (self.b + altitude) * (self.b + altitude);
        let a = (los.x * los.x + los.y * los.y) / ae2 + los.z * los.z / ap2;
        let b = (position.x * los.x + position.y * los.y) / ae2 + position.z * los.z / ap2;
        let c = (position.x * position.x + position.y * position.y) / ae2
            + position.z * position.z / ap2
            - 1.0;
        let disc = b * b - a * c;
        if disc < 0.0 || a == 0.0 {
            return Err(PushbroomError::NoIntersection);
        }
        let k1 = if b > 0.0 {
            -(b + disc.sqrt()) / a
        } else {
            c / (-b + disc.sqrt())
        };
        let k2 = c / (a * k1);
        let k = if k1.abs() <= k2.abs() { k1 } else { k2 };
        Ok(position + k * los)
    }

    /// Intersection of the ray with the iso-geodetic-latitude cone,
    /// picking the admissible root closest to `close`.
    ///
    /// The set of points of geodetic latitude φ (at any altitude) is a
    /// cone with its apex on the polar axis at `z = -e²·N(φ)·sin φ`.
    /// Only the nappe on the correct side of the apex qualifies.
    pub fn point_at_latitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        latitude: f64,
        close: &Vector3<f64>,
    ) -> Option<Vector3<f64>> {
        let (sin_lat, cos_lat) = latitude.sin_cos();
        let apex_z = -self.e2 * self.prime_vertical_radius(sin_lat) * sin_lat;
        let sin2 = sin_lat * sin_lat;
        let cos2 = cos_lat * cos_lat;

        let dz = position.z - apex_z;
        let a = sin2 * (los.x * los.x + los.y * los.y) - cos2 * los.z * los.z;
        let b = sin2 * (position.x * los.x + position.y * los.y) - cos2 * dz * los.z;
        let c = sin2 * (position.x * position.x + position.y * position.y) - cos2 * dz * dz;

        let mut roots: [Option<f64>; 2] = [None, None];
        if a.abs() < 1.0e-24 {
            if b.abs() > 1.0e-24 {
                roots[0] = Some(-0.5 * c / b);
            }
        } else {
            let disc = b * b - a * c;
            if disc < 0.0 {
                return None;
            }
            let k1 = if b > 0.0 {
                -(b + disc.sqrt()) / a
            } else {
                c / (-b + disc.sqrt())
            };
            roots[0] = Some(k1);
            if k1 != 0.0 {
                roots[1] = Some(c / (a * k1));
            }
        }

        let mut best: Option<(f64, Vector3<f64>)> = None;
        for k in roots.into_iter().flatten() {
            let p = position + k * los;
            // reject the wrong nappe (the cone is double for φ ≠ 0)
            if sin_lat * (p.z - apex_z) < -1.0e-9 * self.a * sin_lat.abs() {
                continue;
            }
            let d = (p - close).norm_squared();
            if best.map_or(true, |(db, _)| d < db) {
                best = Some((d, p));
            }
        }
        best.map(|(_, p)| p)
    }

    /// Intersection of the ray with the meridian plane of `longitude`,
    /// or `None` when the ray is parallel to it.
    pub fn point_at_longitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        longitude: f64,
    ) -> Option<Vector3<f64>> {
        let (sin_lon, cos_lon) = longitude.sin_cos();
        let normal = Vector3::new(-sin_lon, cos_lon, 0.0);
        let rate = los.dot(&normal);
        if rate.abs() < 1.0e-15 {
            return None;
        }
        let k = -position.dot(&normal) / rate;
        Some(position + k * los)
    }

    /// First ground point seen along the ray at the given altitude.
    pub fn point_on_ground(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        altitude: f64,
        longitude_reference: f64,
    ) -> Result<GeodeticPoint, PushbroomError> {
        let p = self.point_at_altitude(position, los, altitude)?;
        let mut gp = self.geodetic_near(&p, longitude_reference);
        // the inflated-axes surface is not exactly the altitude surface;
        // the geodetic altitude carries the difference, pin it
        gp.altitude = altitude;
        Ok(gp)
    }

    /// Unit vector pointing away from the ellipsoid at `point`.
    pub fn zenith(&self, point: &GeodeticPoint) -> Vector3<f64> {
        let (sin_lat, cos_lat) = point.latitude.sin_cos();
        let (sin_lon, cos_lon) = point.longitude.sin_cos();
        Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat)
    }

    /// First-order geodetic direction of a Cartesian line of sight at a
    /// point: `(dlat/ds, dlon/ds, dalt/ds)` for an arc length `s` in
    /// meters, computed through the local north/east/zenith frame.
    pub fn convert_los(&self, point: &GeodeticPoint, los: &Vector3<f64>) -> Vector3<f64> {
        let unit = los.normalize();
        let (sin_lat, cos_lat) = point.latitude.sin_cos();
        let (sin_lon, cos_lon) = point.longitude.sin_cos();
        let zenith = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);
        let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let east = Vector3::new(-sin_lon, cos_lon, 0.0);

        let n = self.prime_vertical_radius(sin_lat);
        let denom = 1.0 - self.e2 * sin_lat * sin_lat;
        let meridian_radius = self.a * (1.0 - self.e2) / (denom * denom.sqrt());

        Vector3::new(
            unit.dot(&north) / (meridian_radius + point.altitude),
            unit.dot(&east) / ((n + point.altitude) * cos_lat),
            unit.dot(&zenith),
        )
    }
}
