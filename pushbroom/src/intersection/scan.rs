//! Exhaustive ray/DEM intersection, the slow oracle.

use super::{
    check_watchdog, find_exit, locate_entry, step_into_next_tile, IntersectionAlgorithm, NextTile,
};
use crate::{ellipsoid::Ellipsoid, PushbroomError};
use demgrid::{GeodeticPoint, Tile, TileCache, TileUpdater};
use nalgebra::Vector3;

/// Tests every cell of every traversed tile and keeps the closest hit.
///
/// Orders of magnitude slower than [`super::DuvenhageAlgorithm`] and
/// kept for exactly that reason: an algorithm with no pruning to compare
/// the accelerated walker against.
pub struct ExhaustiveScanAlgorithm<U: TileUpdater> {
    cache: TileCache<U>,
}

impl<U: TileUpdater> ExhaustiveScanAlgorithm<U> {
    pub fn new(updater: U, max_cached_tiles: usize) -> Self {
        Self {
            cache: TileCache::new(max_cached_tiles, updater),
        }
    }

    /// Intersection of the ray with one cell, linearized at the point of
    /// the ray closest to the cell and polished once.
    fn cell_hit(
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        tile: &Tile,
        cell: (usize, usize),
    ) -> Option<GeodeticPoint> {
        let mut mean = 0.0;
        for (di, dj) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
            mean += 0.25 * tile.elevation(cell.0 + di, cell.1 + dj).ok()?;
        }
        let center = GeodeticPoint::new(
            tile.latitude_at(cell.0 as isize) + 0.5 * tile.latitude_step(),
            tile.longitude_at(cell.1 as isize) + 0.5 * tile.longitude_step(),
            mean,
        );
        let s = (ellipsoid.cartesian(&center) - position).dot(los) / los.norm_squared();
        if s <= 0.0 {
            return None;
        }
        let mut base = ellipsoid.geodetic_near(&(position + s * los), tile.min_longitude());
        let mut result = None;
        for _ in 0..3 {
            let Some(hit) =
                tile.cell_intersection(&base, &ellipsoid.convert_los(&base, los), cell.0, cell.1)
            else {
                break;
            };
            result = Some(hit);
            // polish: re-linearize at the ray point closest to the hit
            let delta = ellipsoid.cartesian(&hit) - position;
            let s = delta.dot(los) / los.norm_squared();
            base = ellipsoid.geodetic_near(&(position + s * los), tile.min_longitude());
        }
        result
    }
}

impl<U: TileUpdater> IntersectionAlgorithm for ExhaustiveScanAlgorithm<U> {
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<GeodeticPoint, PushbroomError> {
        let watchdog = self.cache.accesses();
        let (mut tile, mut current) =
            locate_entry(&mut self.cache, ellipsoid, position, los, watchdog)?;
        loop {
            check_watchdog(&self.cache, watchdog)?;
            let mut best: Option<(f64, GeodeticPoint)> = None;
            for i in 0..tile.latitude_rows() - 1 {
                for j in 0..tile.longitude_columns() - 1 {
                    if let Some(gp) = Self::cell_hit(ellipsoid, position, los, &tile, (i, j)) {
                        let s = (ellipsoid.cartesian(&gp) - position).dot(los);
                        if best.as_ref().map_or(true, |(sb, _)| s < *sb) {
                            best = Some((s, gp));
                        }
                    }
                }
            }
            if let Some((_, gp)) = best {
                return Ok(gp);
            }
            let exit = find_exit(ellipsoid, &tile, position, los, &current)?;
            if !exit.at_side {
                return Err(PushbroomError::Internal(
                    "ray reached the tile floor without intersection",
                ));
            }
            match step_into_next_tile(&mut self.cache, ellipsoid, los, &exit)? {
                NextTile::Hit(gp) => return Ok(gp),
                NextTile::Continue(next, entry) => {
                    tile = next;
                    current = entry;
                }
            }
        }
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        guess: &GeodeticPoint,
    ) -> Result<GeodeticPoint, PushbroomError> {
        let tile = self.cache.get_tile(guess.latitude, guess.longitude)?;
        let normalized = guess.normalized(tile.min_longitude());
        let cell = tile.nearest_cell(normalized.latitude, normalized.longitude);
        let delta = ellipsoid.cartesian(&normalized) - position;
        let s = delta.dot(los) / los.norm_squared();
        let base = ellipsoid.geodetic_near(&(position + s * los), tile.min_longitude());
        Ok(tile
            .cell_intersection(&base, &ellipsoid.convert_los(&base, los), cell.0, cell.1)
            .unwrap_or(normalized))
    }

    fn elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PushbroomError> {
        let tile = self.cache.get_tile(latitude, longitude)?;
        Ok(tile.interpolate(latitude, longitude)?)
    }
}
