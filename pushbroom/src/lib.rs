#![cfg_attr(not(doctest), doc = include_str!("../README.md"))]

pub use crate::{
    correction::{aberration_of_light, apparent_los, SPEED_OF_LIGHT},
    crossing::{CrossingResult, MeanPlaneCrossing},
    dual::{Dual, DualSeed, DualVector3},
    dump::DumpSink,
    ellipsoid::Ellipsoid,
    engine::{Engine, EngineBuilder},
    epoch::Epoch,
    error::PushbroomError,
    intersection::{
        ConstantElevationAlgorithm, DuvenhageAlgorithm, ExhaustiveScanAlgorithm,
        IntersectionAlgorithm,
    },
    los::{
        CompositeLos, FixedRotation, FixedZHomothety, LosBuilder, LosProvider, LosTransform,
        PolynomialRotation,
    },
    refraction::{CorrectionGrid, RefractionModel},
    sensor::{LineDatation, LineSensor, LinearLineDatation, SensorPixel},
    trajectory::{
        AttitudeSample, BodyRotation, InterpolationConfig, PvSample, SampledTrajectory,
        TransformProvider,
    },
    transform::Transform,
};
pub use demgrid;
pub use demgrid::GeodeticPoint;

mod correction;
mod crossing;
mod dual;
mod dump;
mod ellipsoid;
mod engine;
mod epoch;
mod error;
mod hermite;
mod intersection;
mod los;
mod refraction;
mod sensor;
#[cfg(test)]
mod tests;
mod trajectory;
mod transform;
