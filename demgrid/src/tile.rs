use crate::{
    geo::{polygon, Polygon},
    geodetic::GeodeticPoint,
    minmax::MinMaxTree,
    DemError, C,
};
use nalgebra::Vector3;

/// Where a (latitude, longitude) query sits relative to a tile.
///
/// Anything other than [`Location::HasInterpolationNeighbors`] names the
/// compass sector of the query around the tile; the intersector uses it
/// to decide which neighbouring tile to switch to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Location {
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    /// The query is inside the tile and can be bilinearly interpolated.
    HasInterpolationNeighbors,
}

/// A rectangular lat/lon raster of elevations.
///
/// A tile goes through three stages: geometry definition, elevation
/// filling, and sealing. Sealing freezes the raster and builds the
/// min–max quad-tree; all read accessors require a sealed tile. The
/// cache drives this lifecycle through the user-supplied updater.
///
/// Node `(i, j)` sits at `(min_latitude + i·latitude_step,
/// min_longitude + j·longitude_step)`; row 0 is the southernmost row.
/// Tiles adjacent in latitude or longitude are expected to share their
/// boundary nodes (one-node overlap).
pub struct Tile {
    min_latitude: C,
    min_longitude: C,
    latitude_step: C,
    longitude_step: C,
    latitude_rows: usize,
    longitude_columns: usize,
    elevations: Vec<C>,
    min_elevation: C,
    max_elevation: C,
    tree: Option<MinMaxTree>,
    sealed: bool,
    has_geometry: bool,
}

impl Default for Tile {
    fn default() -> Self {
        Self::new()
    }
}

impl Tile {
    /// Returns an empty tile awaiting its geometry.
    pub fn new() -> Self {
        Self {
            min_latitude: 0.0,
            min_longitude: 0.0,
            latitude_step: 0.0,
            longitude_step: 0.0,
            latitude_rows: 0,
            longitude_columns: 0,
            elevations: Vec::new(),
            min_elevation: C::INFINITY,
            max_elevation: C::NEG_INFINITY,
            tree: None,
            sealed: false,
            has_geometry: false,
        }
    }

    /// Defines the raster geometry. Must be called exactly once, before
    /// any elevation is set. Angles in radians.
    pub fn set_geometry(
        &mut self,
        min_latitude: C,
        min_longitude: C,
        latitude_step: C,
        longitude_step: C,
        latitude_rows: usize,
        longitude_columns: usize,
    ) -> Result<(), DemError> {
        if self.has_geometry {
            return Err(DemError::Internal("tile geometry already set"));
        }
        if latitude_step <= 0.0 || longitude_step <= 0.0 || latitude_rows < 2 || longitude_columns < 2
        {
            return Err(DemError::Internal("invalid tile geometry"));
        }
        self.min_latitude = min_latitude;
        self.min_longitude = min_longitude;
        self.latitude_step = latitude_step;
        self.longitude_step = longitude_step;
        self.latitude_rows = latitude_rows;
        self.longitude_columns = longitude_columns;
        self.elevations = vec![0.0; latitude_rows * longitude_columns];
        self.has_geometry = true;
        Ok(())
    }

    /// Sets the elevation of node `(row, col)` in meters.
    pub fn set_elevation(&mut self, row: usize, col: usize, elevation: C) -> Result<(), DemError> {
        if !self.has_geometry {
            return Err(DemError::Internal("tile geometry not set"));
        }
        if self.sealed {
            return Err(DemError::Internal("tile already sealed"));
        }
        if row >= self.latitude_rows || col >= self.longitude_columns {
            return Err(DemError::OutOfRange {
                row,
                col,
                rows: self.latitude_rows,
                cols: self.longitude_columns,
            });
        }
        self.elevations[row * self.longitude_columns + col] = elevation;
        Ok(())
    }

    /// Freezes the raster and builds the min–max quad-tree.
    pub fn seal(&mut self) -> Result<(), DemError> {
        if !self.has_geometry {
            return Err(DemError::Internal("tile geometry not set"));
        }
        if self.sealed {
            return Err(DemError::Internal("tile already sealed"));
        }
        let (mut lo, mut hi) = (C::INFINITY, C::NEG_INFINITY);
        for &e in &self.elevations {
            lo = lo.min(e);
            hi = hi.max(e);
        }
        self.min_elevation = lo;
        self.max_elevation = hi;
        self.tree = Some(MinMaxTree::new(
            &self.elevations,
            self.latitude_rows,
            self.longitude_columns,
        ));
        self.sealed = true;
        Ok(())
    }

    /// Latitude of the southernmost node row.
    pub fn min_latitude(&self) -> C {
        self.min_latitude
    }

    /// Longitude of the westernmost node column.
    pub fn min_longitude(&self) -> C {
        self.min_longitude
    }

    /// Latitude of the northernmost node row.
    pub fn max_latitude(&self) -> C {
        self.latitude_at(self.latitude_rows as isize - 1)
    }

    /// Longitude of the easternmost node column.
    pub fn max_longitude(&self) -> C {
        self.longitude_at(self.longitude_columns as isize - 1)
    }

    /// Node spacing in latitude, radians.
    pub fn latitude_step(&self) -> C {
        self.latitude_step
    }

    /// Node spacing in longitude, radians.
    pub fn longitude_step(&self) -> C {
        self.longitude_step
    }

    /// Number of node rows.
    pub fn latitude_rows(&self) -> usize {
        self.latitude_rows
    }

    /// Number of node columns.
    pub fn longitude_columns(&self) -> usize {
        self.longitude_columns
    }

    /// Latitude of node row `i` (may be outside the raster).
    pub fn latitude_at(&self, i: isize) -> C {
        self.min_latitude + i as C * self.latitude_step
    }

    /// Longitude of node column `j` (may be outside the raster).
    pub fn longitude_at(&self, j: isize) -> C {
        self.min_longitude + j as C * self.longitude_step
    }

    /// Row index of the cell containing `latitude`, unclamped.
    pub fn floor_latitude_index(&self, latitude: C) -> isize {
        ((latitude - self.min_latitude) / self.latitude_step).floor() as isize
    }

    /// Column index of the cell containing `longitude`, unclamped.
    pub fn floor_longitude_index(&self, longitude: C) -> isize {
        ((longitude - self.min_longitude) / self.longitude_step).floor() as isize
    }

    /// South-west node of the cell containing the query, or `None` when
    /// the query is outside the tile. Queries on the northern or eastern
    /// edges are attributed to the last cell.
    pub fn cell_indices(&self, latitude: C, longitude: C) -> Option<(usize, usize)> {
        if self.location(latitude, longitude) != Location::HasInterpolationNeighbors {
            return None;
        }
        Some(self.nearest_cell(latitude, longitude))
    }

    /// Nearest valid cell for a query, clamped at the raster edges. The
    /// query is not required to be inside the tile.
    pub fn nearest_cell(&self, latitude: C, longitude: C) -> (usize, usize) {
        let i = self
            .floor_latitude_index(latitude)
            .clamp(0, self.latitude_rows as isize - 2) as usize;
        let j = self
            .floor_longitude_index(longitude)
            .clamp(0, self.longitude_columns as isize - 2) as usize;
        (i, j)
    }

    /// Classifies a query against the tile extent. Boundary nodes count
    /// as inside, matching the one-node overlap between adjacent tiles.
    pub fn location(&self, latitude: C, longitude: C) -> Location {
        let south = latitude < self.min_latitude;
        let north = latitude > self.max_latitude();
        let west = longitude < self.min_longitude;
        let east = longitude > self.max_longitude();
        match (south, north, west, east) {
            (true, _, true, _) => Location::SouthWest,
            (true, _, _, true) => Location::SouthEast,
            (_, true, true, _) => Location::NorthWest,
            (_, true, _, true) => Location::NorthEast,
            (true, ..) => Location::South,
            (_, true, ..) => Location::North,
            (_, _, true, _) => Location::West,
            (_, _, _, true) => Location::East,
            _ => Location::HasInterpolationNeighbors,
        }
    }

    /// Elevation of node `(row, col)` in meters.
    pub fn elevation(&self, row: usize, col: usize) -> Result<C, DemError> {
        if !self.sealed {
            return Err(DemError::Internal("tile not sealed"));
        }
        if row >= self.latitude_rows || col >= self.longitude_columns {
            return Err(DemError::OutOfRange {
                row,
                col,
                rows: self.latitude_rows,
                cols: self.longitude_columns,
            });
        }
        Ok(self.elevations[row * self.longitude_columns + col])
    }

    fn node(&self, row: usize, col: usize) -> C {
        self.elevations[row * self.longitude_columns + col]
    }

    /// Bilinearly interpolated elevation at a point inside the tile.
    pub fn interpolate(&self, latitude: C, longitude: C) -> Result<C, DemError> {
        if !self.sealed {
            return Err(DemError::Internal("tile not sealed"));
        }
        if self.location(latitude, longitude) != Location::HasInterpolationNeighbors {
            return Err(DemError::OutOfTile {
                latitude,
                longitude,
            });
        }
        let (i, j) = self.nearest_cell(latitude, longitude);
        let dy = (latitude - self.latitude_at(i as isize)) / self.latitude_step;
        let dx = (longitude - self.longitude_at(j as isize)) / self.longitude_step;
        Ok(self.node(i, j) * (1.0 - dx) * (1.0 - dy)
            + self.node(i, j + 1) * dx * (1.0 - dy)
            + self.node(i + 1, j) * (1.0 - dx) * dy
            + self.node(i + 1, j + 1) * dx * dy)
    }

    /// Lowest node elevation; meaningful once sealed.
    pub fn min_elevation(&self) -> C {
        self.min_elevation
    }

    /// Highest node elevation; meaningful once sealed.
    pub fn max_elevation(&self) -> C {
        self.max_elevation
    }

    /// The min–max quad-tree, available once sealed.
    pub fn tree(&self) -> Option<&MinMaxTree> {
        self.tree.as_ref()
    }

    /// Intersection of a geodetic-space ray with the bilinear elevation
    /// patch of cell `(i, j)`.
    ///
    /// `entry` is a point on the ray; `los` is the geodetic direction of
    /// the ray at that point, components `(dlat/ds, dlon/ds, dalt/ds)`
    /// for an arc length `s` in meters. Within one cell the ray is
    /// linear in `(lat, lon, alt)` and the patch is bilinear, so the
    /// intersection reduces to a quadratic in `s`. Returns the solution
    /// of smallest `s` that falls inside the cell; `s` may be slightly
    /// negative when `entry` was seeded past the surface.
    pub fn cell_intersection(
        &self,
        entry: &GeodeticPoint,
        los: &Vector3<C>,
        i: usize,
        j: usize,
    ) -> Option<GeodeticPoint> {
        if i + 1 >= self.latitude_rows || j + 1 >= self.longitude_columns {
            return None;
        }
        let z00 = self.node(i, j);
        let z01 = self.node(i, j + 1);
        let z10 = self.node(i + 1, j);
        let z11 = self.node(i + 1, j + 1);
        let zx = z01 - z00;
        let zy = z10 - z00;
        let zxy = z00 - z01 - z10 + z11;

        // cell-normalized coordinates of the entry point and their rates
        let dy_a = (entry.latitude - self.latitude_at(i as isize)) / self.latitude_step;
        let dx_a = (entry.longitude - self.longitude_at(j as isize)) / self.longitude_step;
        let dy_r = los.x / self.latitude_step;
        let dx_r = los.y / self.longitude_step;

        // E(s) - alt(s) = a2 s^2 + a1 s + a0
        let a2 = zxy * dx_r * dy_r;
        let a1 = zx * dx_r + zy * dy_r + zxy * (dx_a * dy_r + dy_a * dx_r) - los.z;
        let a0 = z00 + zx * dx_a + zy * dy_a + zxy * dx_a * dy_a - entry.altitude;

        let mut candidates: [Option<C>; 2] = [None, None];
        if a2.abs() < 1.0e-20 {
            if a1.abs() > 1.0e-20 {
                candidates[0] = Some(-a0 / a1);
            }
        } else {
            let disc = a1 * a1 - 4.0 * a2 * a0;
            if disc < 0.0 {
                return None;
            }
            let q = -0.5 * (a1 + a1.signum() * disc.sqrt());
            candidates[0] = Some(q / a2);
            if q.abs() > 0.0 {
                candidates[1] = Some(a0 / q);
            }
        }

        let mut best: Option<(C, GeodeticPoint)> = None;
        for s in candidates.into_iter().flatten() {
            let dx = dx_a + s * dx_r;
            let dy = dy_a + s * dy_r;
            if !(-1.0e-10..=1.0 + 1.0e-10).contains(&dx) || !(-1.0e-10..=1.0 + 1.0e-10).contains(&dy)
            {
                continue;
            }
            let gp = GeodeticPoint::new(
                entry.latitude + s * los.x,
                entry.longitude + s * los.y,
                entry.altitude + s * los.z,
            );
            if best.map_or(true, |(sb, _)| s < sb) {
                best = Some((s, gp));
            }
        }
        best.map(|(_, gp)| gp)
    }

    /// Tile outline as a lon/lat polygon in degrees, south-west first.
    pub fn footprint(&self) -> Polygon {
        let w = self.min_longitude.to_degrees();
        let e = self.max_longitude().to_degrees();
        let s = self.min_latitude.to_degrees();
        let n = self.max_latitude().to_degrees();
        polygon![
            (x: w, y: s),
            (x: e, y: s),
            (x: e, y: n),
            (x: w, y: n),
            (x: w, y: s),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn flat_tile(elevation: C) -> Tile {
        let mut tile = Tile::new();
        tile.set_geometry(0.1, 0.2, 1.0e-3, 1.0e-3, 11, 11).unwrap();
        for i in 0..11 {
            for j in 0..11 {
                tile.set_elevation(i, j, elevation).unwrap();
            }
        }
        tile.seal().unwrap();
        tile
    }

    #[test]
    fn geometry_can_only_be_set_once() {
        let mut tile = Tile::new();
        tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 4, 4).unwrap();
        assert!(tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 4, 4).is_err());
    }

    #[test]
    fn degenerate_geometry_is_rejected() {
        let mut tile = Tile::new();
        assert!(tile.set_geometry(0.0, 0.0, 0.0, 1.0e-3, 4, 4).is_err());
        assert!(tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 1, 4).is_err());
    }

    #[test]
    fn elevation_indices_are_checked() {
        let mut tile = Tile::new();
        tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 4, 4).unwrap();
        assert!(matches!(
            tile.set_elevation(4, 0, 1.0),
            Err(DemError::OutOfRange { .. })
        ));
        tile.set_elevation(3, 3, 1.0).unwrap();
        tile.seal().unwrap();
        assert!(tile.set_elevation(0, 0, 1.0).is_err());
        assert!(matches!(
            tile.elevation(0, 4),
            Err(DemError::OutOfRange { .. })
        ));
    }

    #[test]
    fn unsealed_tile_cannot_be_read() {
        let mut tile = Tile::new();
        tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 4, 4).unwrap();
        assert!(tile.elevation(0, 0).is_err());
        assert!(tile.interpolate(1.0e-3, 1.0e-3).is_err());
    }

    #[test]
    fn bilinear_interpolation_matches_plane() {
        let mut tile = Tile::new();
        tile.set_geometry(0.0, 0.0, 1.0e-3, 1.0e-3, 5, 5).unwrap();
        // elevation is an affine function of (lat, lon): bilinear
        // interpolation must reproduce it exactly
        for i in 0..5 {
            for j in 0..5 {
                let h = 100.0 + 3.0e4 * (i as C * 1.0e-3) + 7.0e4 * (j as C * 1.0e-3);
                tile.set_elevation(i, j, h).unwrap();
            }
        }
        tile.seal().unwrap();
        let (lat, lon) = (1.7e-3, 3.3e-3);
        assert_relative_eq!(
            tile.interpolate(lat, lon).unwrap(),
            100.0 + 3.0e4 * lat + 7.0e4 * lon,
            epsilon = 1.0e-9
        );
        assert_eq!(tile.min_elevation(), 100.0);
        assert_relative_eq!(tile.max_elevation(), 100.0 + 120.0 + 280.0, epsilon = 1.0e-9);
    }

    #[test]
    fn location_classifies_all_sectors() {
        let tile = flat_tile(0.0);
        let (s, w) = (0.1, 0.2);
        let (n, e) = (0.11, 0.21);
        assert_eq!(tile.location(s + 5.0e-3, w + 5.0e-3), Location::HasInterpolationNeighbors);
        assert_eq!(tile.location(s, w), Location::HasInterpolationNeighbors);
        assert_eq!(tile.location(n, e), Location::HasInterpolationNeighbors);
        assert_eq!(tile.location(s - 1.0e-3, w + 5.0e-3), Location::South);
        assert_eq!(tile.location(n + 1.0e-3, w + 5.0e-3), Location::North);
        assert_eq!(tile.location(s + 5.0e-3, w - 1.0e-3), Location::West);
        assert_eq!(tile.location(s + 5.0e-3, e + 1.0e-3), Location::East);
        assert_eq!(tile.location(s - 1.0e-3, w - 1.0e-3), Location::SouthWest);
        assert_eq!(tile.location(s - 1.0e-3, e + 1.0e-3), Location::SouthEast);
        assert_eq!(tile.location(n + 1.0e-3, w - 1.0e-3), Location::NorthWest);
        assert_eq!(tile.location(n + 1.0e-3, e + 1.0e-3), Location::NorthEast);
    }

    #[test]
    fn cell_intersection_hits_flat_patch() {
        let tile = flat_tile(50.0);
        // descending ray through the middle of cell (5, 5)
        let entry = GeodeticPoint::new(0.1055, 0.2055, 100.0);
        let los = Vector3::new(1.0e-8, 1.0e-8, -1.0);
        let gp = tile.cell_intersection(&entry, &los, 5, 5).unwrap();
        assert_relative_eq!(gp.altitude, 50.0, epsilon = 1.0e-9);
        assert_relative_eq!(gp.latitude, 0.1055 + 50.0e-8, epsilon = 1.0e-12);
    }

    #[test]
    fn cell_intersection_misses_when_ray_stays_above() {
        let tile = flat_tile(50.0);
        let entry = GeodeticPoint::new(0.1055, 0.2055, 100.0);
        let los = Vector3::new(1.0e-6, 0.0, 0.0);
        assert!(tile.cell_intersection(&entry, &los, 5, 5).is_none());
    }

    #[test]
    fn footprint_is_in_degrees() {
        let tile = flat_tile(0.0);
        let poly = tile.footprint();
        let first = poly.exterior().0[0];
        assert_relative_eq!(first.x, 0.2_f64.to_degrees(), epsilon = 1.0e-12);
        assert_relative_eq!(first.y, 0.1_f64.to_degrees(), epsilon = 1.0e-12);
    }
}
