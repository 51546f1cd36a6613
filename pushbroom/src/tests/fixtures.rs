//! A shared synthetic scene: a 700 km circular equatorial orbit over
//! WGS84 with a nadir-pointing spacecraft, a cross-track pushbroom fan,
//! and procedural elevation tiles.

use crate::{
    AttitudeSample, BodyRotation, Ellipsoid, Engine, EngineBuilder, Epoch, IntersectionAlgorithm,
    LineSensor, LinearLineDatation, LosBuilder, PvSample, SampledTrajectory,
    InterpolationConfig,
};
use demgrid::{DemError, Tile, TileUpdater};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub(crate) const MU: f64 = 3.986_004_418e14;
pub(crate) const ORBIT_ALTITUDE: f64 = 700_000.0;

/// Circular equatorial orbit samples centered on the reference epoch,
/// with the spacecraft z axis on the nadir and x along the velocity.
pub(crate) fn orbit(
    ellipsoid: &Ellipsoid,
    count: usize,
    spacing: f64,
) -> (Vec<PvSample>, Vec<AttitudeSample>) {
    let radius = ellipsoid.equatorial_radius() + ORBIT_ALTITUDE;
    let omega = (MU / radius.powi(3)).sqrt();
    let start = -((count - 1) as f64) / 2.0 * spacing;
    let mut pv = Vec::with_capacity(count);
    let mut attitude = Vec::with_capacity(count);
    for k in 0..count {
        let t = start + k as f64 * spacing;
        let (sin, cos) = (omega * t).sin_cos();
        let date = Epoch::REFERENCE + t;
        pv.push(PvSample {
            date,
            position: radius * Vector3::new(cos, sin, 0.0),
            velocity: radius * omega * Vector3::new(-sin, cos, 0.0),
        });
        let x = Vector3::new(-sin, cos, 0.0); // along track
        let z = Vector3::new(-cos, -sin, 0.0); // nadir
        let y = z.cross(&x);
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(
            Matrix3::from_columns(&[x, y, z]),
        ));
        attitude.push(AttitudeSample { date, rotation });
    }
    (pv, attitude)
}

/// A pushbroom fan of `pixels` directions spread by `ifov` around a
/// cross-track `tilt`, with an optional along-track `sagitta` bowing the
/// fan out of its plane. Line 0 starts half the line count before the
/// reference epoch.
pub(crate) fn fan_sensor(
    name: &str,
    pixels: usize,
    ifov: f64,
    tilt: f64,
    sagitta: f64,
    lines: f64,
    rate: f64,
) -> LineSensor {
    let center = (pixels as f64 - 1.0) / 2.0;
    let raw: Vec<Vector3<f64>> = (0..pixels)
        .map(|i| {
            let gamma = tilt + (i as f64 - center) * ifov;
            let u = if pixels > 1 {
                (i as f64 - center) / center
            } else {
                0.0
            };
            let bow = sagitta * (1.0 - u * u);
            let fan = Vector3::new(0.0, gamma.sin(), gamma.cos());
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), bow) * fan
        })
        .collect();
    LineSensor::new(
        name,
        Vector3::zeros(),
        LinearLineDatation::new(Epoch::REFERENCE, (lines - 1.0) / 2.0, rate),
        LosBuilder::new(raw).build(),
    )
}

/// Procedural elevation model: a sum of long sinusoidal swells, smooth
/// and seamless across tiles. One-degree tiles with one-node overlap.
#[derive(Clone)]
pub(crate) struct SyntheticLandscape {
    waves: Vec<[f64; 4]>,
    base: f64,
    nodes: usize,
}

impl SyntheticLandscape {
    pub fn random(seed: u64, nodes: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let waves = (0..6)
            .map(|_| {
                [
                    rng.gen_range(80.0..260.0),
                    rng.gen_range(-900.0..900.0),
                    rng.gen_range(-900.0..900.0),
                    rng.gen_range(0.0..std::f64::consts::TAU),
                ]
            })
            .collect();
        Self {
            waves,
            base: 300.0,
            nodes,
        }
    }

    pub fn elevation(&self, latitude: f64, longitude: f64) -> f64 {
        self.base
            + self
                .waves
                .iter()
                .map(|[amp, ka, kb, phase]| amp * (ka * latitude + kb * longitude + phase).sin())
                .sum::<f64>()
    }
}

impl TileUpdater for SyntheticLandscape {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut Tile) -> Result<(), DemError> {
        let extent = 1.0_f64.to_radians();
        let lat0 = (latitude / extent).floor() * extent;
        let lon0 = (longitude / extent).floor() * extent;
        let step = extent / (self.nodes - 1) as f64;
        tile.set_geometry(lat0, lon0, step, step, self.nodes, self.nodes)?;
        for i in 0..self.nodes {
            for j in 0..self.nodes {
                let h = self.elevation(lat0 + i as f64 * step, lon0 + j as f64 * step);
                tile.set_elevation(i, j, h)?;
            }
        }
        Ok(())
    }
}

/// Assembles an engine over the shared orbit.
pub(crate) fn engine_with(
    algorithm: impl IntersectionAlgorithm + 'static,
    sensor: LineSensor,
    rotating_body: bool,
    light_time: bool,
    aberration: bool,
) -> Engine {
    let ellipsoid = Ellipsoid::wgs84();
    let (pv, attitude) = orbit(&ellipsoid, 61, 0.5);
    let body = if rotating_body {
        BodyRotation::earth(Epoch::REFERENCE)
    } else {
        BodyRotation::frozen(Epoch::REFERENCE)
    };
    let provider =
        SampledTrajectory::new(pv, attitude, body, InterpolationConfig::default()).unwrap();
    EngineBuilder::new(ellipsoid)
        .provider(provider)
        .algorithm(algorithm)
        .sensor(sensor)
        .light_time(light_time)
        .aberration(aberration)
        .build()
        .unwrap()
}
