//! Ray/DEM intersection algorithms.
//!
//! All algorithms share the same capability surface so the engine can
//! swap them: the min–max-tree accelerated walker for production, the
//! exhaustive scan as a slow oracle, and the ellipsoid-only variant for
//! configurations that ignore the DEM altogether.

use crate::{ellipsoid::Ellipsoid, PushbroomError};
use demgrid::{GeodeticPoint, Location, Tile, TileCache, TileUpdater};
use nalgebra::Vector3;
use std::rc::Rc;

mod constant;
mod duvenhage;
mod scan;

pub use constant::ConstantElevationAlgorithm;
pub use duvenhage::DuvenhageAlgorithm;
pub use scan::ExhaustiveScanAlgorithm;

/// Capability set of a ray/DEM intersector.
pub trait IntersectionAlgorithm {
    /// First intersection of the ray `position + k·los` (k ≥ 0) with
    /// the DEM surface, approximate to one cell.
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<GeodeticPoint, PushbroomError>;

    /// Bilinearly refined intersection in the cell containing `guess`.
    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        guess: &GeodeticPoint,
    ) -> Result<GeodeticPoint, PushbroomError>;

    /// DEM elevation at a point, meters.
    fn elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PushbroomError>;
}

/// Margin above a tile's highest node for the entry search, meters.
/// Also absorbs the inflated-axes approximation of `point_at_altitude`.
pub(crate) const ALTITUDE_MARGIN: f64 = 0.1;

/// Step past a tile boundary when switching tiles, meters.
pub(crate) const FORWARD_NUDGE: f64 = 0.01;

/// Tile accesses allowed within one intersection call before the
/// watchdog declares the walk divergent.
pub(crate) const MAX_TILE_ACCESSES: u64 = 1000;

pub(crate) fn check_watchdog<U: TileUpdater>(
    cache: &TileCache<U>,
    start: u64,
) -> Result<(), PushbroomError> {
    let accesses = cache.accesses() - start;
    if accesses > MAX_TILE_ACCESSES {
        return Err(PushbroomError::DoesNotConverge(accesses));
    }
    Ok(())
}

/// Where a ray leaves the current tile.
pub(crate) struct ExitPoint {
    pub point: GeodeticPoint,
    pub cartesian: Vector3<f64>,
    /// True when the exit is through a tile side; false when the ray
    /// reached the tile's minimum elevation inside the tile.
    pub at_side: bool,
}

/// Finds the tile the ray enters the DEM in and the entry point at that
/// tile's ceiling altitude.
pub(crate) fn locate_entry<U: TileUpdater>(
    cache: &mut TileCache<U>,
    ellipsoid: &Ellipsoid,
    position: &Vector3<f64>,
    los: &Vector3<f64>,
    watchdog_start: u64,
) -> Result<(Rc<Tile>, GeodeticPoint), PushbroomError> {
    // first guess straight down to the ellipsoid surface
    let gp0 = ellipsoid.point_on_ground(position, los, 0.0, 0.0)?;
    let mut tile = cache.get_tile(gp0.latitude, gp0.longitude)?;
    let mut ceiling = tile.max_elevation() + ALTITUDE_MARGIN;
    loop {
        check_watchdog(cache, watchdog_start)?;
        let entry = ellipsoid.point_at_altitude(position, los, ceiling)?;
        if (entry - position).dot(los) < 0.0 {
            // the DEM ceiling is behind the sensor
            return Err(PushbroomError::NoIntersection);
        }
        let current = ellipsoid.geodetic_near(&entry, tile.min_longitude());
        if tile.location(current.latitude, current.longitude)
            == Location::HasInterpolationNeighbors
        {
            return Ok((tile, current));
        }
        tile = cache.get_tile(current.latitude, current.longitude)?;
        ceiling = ceiling.max(tile.max_elevation() + ALTITUDE_MARGIN);
    }
}

/// Finds where the ray leaves `tile`: through the floor (the tile's
/// minimum elevation) when that point is inside the tile, otherwise
/// through the closest side ahead of `entry`.
pub(crate) fn find_exit(
    ellipsoid: &Ellipsoid,
    tile: &Tile,
    position: &Vector3<f64>,
    los: &Vector3<f64>,
    entry: &GeodeticPoint,
) -> Result<ExitPoint, PushbroomError> {
    let entry_cartesian = ellipsoid.cartesian(entry);
    let s_entry = (entry_cartesian - position).dot(los);

    if let Ok(bottom) = ellipsoid.point_at_altitude(position, los, tile.min_elevation()) {
        let gp = ellipsoid.geodetic_near(&bottom, tile.min_longitude());
        if (bottom - position).dot(los) >= s_entry
            && tile.location(gp.latitude, gp.longitude) == Location::HasInterpolationNeighbors
        {
            return Ok(ExitPoint {
                point: gp,
                cartesian: bottom,
                at_side: false,
            });
        }
    }

    let lat_slack = tile.latitude_step();
    let lon_slack = tile.longitude_step();
    let mut best: Option<(f64, GeodeticPoint, Vector3<f64>)> = None;
    let mut consider = |p: Vector3<f64>| {
        let gp = ellipsoid.geodetic_near(&p, tile.min_longitude());
        let s = (p - position).dot(los);
        if s <= s_entry
            || gp.latitude < tile.min_latitude() - lat_slack
            || gp.latitude > tile.max_latitude() + lat_slack
            || gp.longitude < tile.min_longitude() - lon_slack
            || gp.longitude > tile.max_longitude() + lon_slack
        {
            return;
        }
        if best.as_ref().map_or(true, |(sb, _, _)| s < *sb) {
            best = Some((s, gp, p));
        }
    };
    for latitude in [tile.min_latitude(), tile.max_latitude()] {
        if let Some(p) = ellipsoid.point_at_latitude(position, los, latitude, &entry_cartesian) {
            consider(p);
        }
    }
    for longitude in [tile.min_longitude(), tile.max_longitude()] {
        if let Some(p) = ellipsoid.point_at_longitude(position, los, longitude) {
            consider(p);
        }
    }
    best.map(|(_, point, cartesian)| ExitPoint {
        point,
        cartesian,
        at_side: true,
    })
    .ok_or(PushbroomError::Internal("ray exit from tile not found"))
}

/// Outcome of stepping past a side exit into the next tile.
pub(crate) enum NextTile {
    /// The nudge itself went below the terrain; the boundary point is
    /// the intersection.
    Hit(GeodeticPoint),
    /// The walk continues in this tile from this entry point.
    Continue(Rc<Tile>, GeodeticPoint),
}

/// Crosses a tile side: nudges slightly past the boundary, fetches the
/// tile there and checks the ray did not dive under its terrain during
/// the nudge.
pub(crate) fn step_into_next_tile<U: TileUpdater>(
    cache: &mut TileCache<U>,
    ellipsoid: &Ellipsoid,
    los: &Vector3<f64>,
    exit: &ExitPoint,
) -> Result<NextTile, PushbroomError> {
    let forward = exit.cartesian + FORWARD_NUDGE * los.normalize();
    let rough = ellipsoid.geodetic(&forward);
    let tile = cache.get_tile(rough.latitude, rough.longitude)?;
    let current = rough.normalized(tile.min_longitude());
    if tile.interpolate(current.latitude, current.longitude)? >= current.altitude {
        return Ok(NextTile::Hit(current));
    }
    Ok(NextTile::Continue(tile, current))
}
