#![deny(missing_docs)]
#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

pub use crate::{
    cache::{TileCache, TileUpdater},
    error::DemError,
    geodetic::{normalize_longitude, GeodeticPoint},
    minmax::{MinMaxTree, Node},
    tile::{Location, Tile},
};
pub use geo;

mod cache;
mod error;
mod geodetic;
mod minmax;
#[cfg(test)]
mod tests;
mod tile;

/// Base floating point type used for all coordinates and elevations.
///
/// Note: this _could_ be a generic parameter, but elevations are
/// interpolated and intersected with rays at sub-meter accuracy over
/// thousand-kilometer distances, so nothing narrower than f64 holds up.
pub type C = f64;
