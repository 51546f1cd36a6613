use crate::epoch::Epoch;
use demgrid::DemError;
use thiserror::Error;

/// Failures of the georeferencing engine.
#[derive(Error, Debug)]
#[allow(clippy::module_name_repetitions)]
pub enum PushbroomError {
    /// A date outside the trajectory span plus the overshoot tolerance.
    #[error("date {0} outside the trajectory time span")]
    OutOfTimeRange(Epoch),

    /// A failure of the tile layer.
    #[error(transparent)]
    Dem(#[from] DemError),

    /// The line of sight never meets the DEM surface.
    #[error("line of sight does not reach the ground")]
    NoIntersection,

    /// The tile-switching watchdog tripped.
    #[error("DEM intersection did not converge after {0} tile accesses")]
    DoesNotConverge(u64),

    /// No sensor registered under the requested name.
    #[error("no sensor registered under name {0:?}")]
    UnknownSensor(String),

    /// A root finder exhausted its iteration budget.
    #[error("root finder exhausted {0} evaluations")]
    SolverFailed(usize),

    /// Invariant violation, non-recoverable.
    #[error("internal error: {0}")]
    Internal(&'static str),
}
