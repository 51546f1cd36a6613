use crate::{Tile, C};

const SUMMIT_LAT_DEG: C = 13.25667;
const SUMMIT_LON_DEG: C = 123.685;
const SUMMIT_ELEVATION: C = 2463.0;
const BASE_ELEVATION: C = 16.0;
const SLOPE_DEG: C = 30.0;
const EARTH_RADIUS: C = 6_378_137.0;

/// Elevation of a regular volcanic cone at `(lat, lon)` in radians.
fn cone_elevation(lat: C, lon: C) -> C {
    let summit_lat = SUMMIT_LAT_DEG.to_radians();
    let summit_lon = SUMMIT_LON_DEG.to_radians();
    // small-extent equirectangular distance is plenty at cone scale
    let dx = (lon - summit_lon) * summit_lat.cos() * EARTH_RADIUS;
    let dy = (lat - summit_lat) * EARTH_RADIUS;
    let distance = dx.hypot(dy);
    (SUMMIT_ELEVATION - distance * SLOPE_DEG.to_radians().tan()).max(BASE_ELEVATION)
}

/// 257x257 tile centered exactly on the summit node.
fn cone_tile() -> Tile {
    let size = 257;
    let step = 1.0_f64.to_radians() / 1200.0;
    let lat0 = SUMMIT_LAT_DEG.to_radians() - 128.0 * step;
    let lon0 = SUMMIT_LON_DEG.to_radians() - 128.0 * step;
    let mut tile = Tile::new();
    tile.set_geometry(lat0, lon0, step, step, size, size).unwrap();
    for i in 0..size {
        for j in 0..size {
            let lat = lat0 + i as C * step;
            let lon = lon0 + j as C * step;
            tile.set_elevation(i, j, cone_elevation(lat, lon)).unwrap();
        }
    }
    tile.seal().unwrap();
    tile
}

#[test]
fn root_extrema_match_summit_and_base() {
    let tile = cone_tile();
    let tree = tile.tree().unwrap();
    let root = tree.root();
    assert_eq!(root.e_min, BASE_ELEVATION);
    // the summit sits on the central node up to floating point noise on
    // the grid origin
    assert!((root.e_max - SUMMIT_ELEVATION).abs() < 1.0e-6);
    assert_eq!(root.e_max, tile.max_elevation());
    assert_eq!(root.e_min, tile.min_elevation());
    assert_eq!((root.sub_rows, root.sub_cols), (256, 256));
}

#[test]
fn every_level_bounds_the_cells_it_covers() {
    let tile = cone_tile();
    let tree = tile.tree().unwrap();
    for &cell in &[(0usize, 0usize), (127, 127), (128, 128), (255, 255), (13, 200)] {
        let cell_extrema = |(i, j): (usize, usize)| {
            let mut lo = C::INFINITY;
            let mut hi = C::NEG_INFINITY;
            for (di, dj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let e = tile.elevation(i + di, j + dj).unwrap();
                lo = lo.min(e);
                hi = hi.max(e);
            }
            (lo, hi)
        };
        let (lo, hi) = cell_extrema(cell);
        for level in 0..tree.levels() {
            assert!(tree.min_elevation(cell, level) <= lo);
            assert!(tree.max_elevation(cell, level) >= hi);
        }
    }
}

#[test]
fn interpolation_near_summit_stays_under_the_peak() {
    let tile = cone_tile();
    let lat = SUMMIT_LAT_DEG.to_radians() + 0.3 * tile.latitude_step();
    let lon = SUMMIT_LON_DEG.to_radians() - 0.4 * tile.longitude_step();
    let h = tile.interpolate(lat, lon).unwrap();
    assert!(h > BASE_ELEVATION);
    assert!(h <= SUMMIT_ELEVATION + 1.0e-9);
}
