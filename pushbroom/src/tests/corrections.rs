//! Magnitude of the light-time and aberration corrections on ground,
//! for the nominal 700 km geometry.

use super::fixtures::{engine_with, fan_sensor};
use crate::{ConstantElevationAlgorithm, Ellipsoid};

const LINES: f64 = 200.0;
const PIXELS: usize = 27;
const IFOV: f64 = 8.0e-4;
const TILT: f64 = 0.489; // ~28 deg off nadir, ~805 km slant range
const RATE: f64 = 100.0;

fn ground_distances(light_time: bool, aberration: bool) -> Vec<f64> {
    let ellipsoid = Ellipsoid::wgs84();
    let mut corrected = engine_with(
        ConstantElevationAlgorithm::new(0.0),
        fan_sensor("line", PIXELS, IFOV, TILT, 0.0, LINES, RATE),
        true,
        light_time,
        aberration,
    );
    let mut plain = engine_with(
        ConstantElevationAlgorithm::new(0.0),
        fan_sensor("line", PIXELS, IFOV, TILT, 0.0, LINES, RATE),
        true,
        false,
        false,
    );
    let line = (LINES - 1.0) / 2.0;
    let with = corrected.direct_location_line("line", line).unwrap();
    let without = plain.direct_location_line("line", line).unwrap();
    with.iter()
        .zip(&without)
        .map(|(a, b)| (ellipsoid.cartesian(a) - ellipsoid.cartesian(b)).norm())
        .collect()
}

#[test]
fn light_time_shifts_the_ground_by_earth_rotation_during_travel() {
    // ~2.7 ms of travel over ~805 km, times the equatorial surface
    // speed: between 1.23 and 1.27 m for every pixel of the fan
    for (pixel, d) in ground_distances(true, false).into_iter().enumerate() {
        assert!(
            (1.23..1.27).contains(&d),
            "pixel {pixel}: light-time shift {d:.4} m out of range"
        );
    }
}

#[test]
fn aberration_deflects_the_ground_point_by_v_over_c_times_range() {
    // ~25 µrad of aberration over ~805 km of slant range
    for (pixel, d) in ground_distances(false, true).into_iter().enumerate() {
        assert!(
            (19.8..20.6).contains(&d),
            "pixel {pixel}: aberration shift {d:.3} m out of range"
        );
    }
}

#[test]
fn corrections_compose_roughly_additively() {
    let both = ground_distances(true, true);
    for (pixel, d) in both.into_iter().enumerate() {
        // aberration displaces along track, light time mostly along
        // track too (body rotation): expect near the sum
        assert!(
            (18.5..22.0).contains(&d),
            "pixel {pixel}: combined shift {d:.3} m out of range"
        );
    }
}
