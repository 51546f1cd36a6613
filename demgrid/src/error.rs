use thiserror::Error;

/// Failures of the tile layer.
#[derive(Error, Debug)]
#[allow(missing_docs, clippy::module_name_repetitions)]
pub enum DemError {
    /// An elevation node index outside the tile raster.
    #[error("node ({row}, {col}) outside {rows}x{cols} raster")]
    OutOfRange {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A geographic query outside the tile extent.
    #[error("point ({latitude} rad, {longitude} rad) is outside the tile")]
    OutOfTile { latitude: f64, longitude: f64 },

    /// The updater could not produce a tile covering the requested point.
    #[error("no tile available covering ({latitude} rad, {longitude} rad)")]
    Unavailable { latitude: f64, longitude: f64 },

    /// A freshly loaded tile does not sit on the grid established by the
    /// first load.
    #[error(
        "tile steps ({latitude_step} rad, {longitude_step} rad) differ from \
         the cache grid ({expected_latitude_step} rad, {expected_longitude_step} rad)"
    )]
    HeterogeneousTiles {
        latitude_step: f64,
        longitude_step: f64,
        expected_latitude_step: f64,
        expected_longitude_step: f64,
    },

    /// Invariant violation, non-recoverable.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
