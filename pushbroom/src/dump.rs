//! Optional text traces of location computations.
//!
//! The sink is threaded through the engine, never global. Records are
//! line oriented:
//!
//! ```text
//! direct location  <ISO-8601 date> px py pz lx ly lz lt:<bool> ab:<bool> ref:<bool>
//! → result           lat lon alt
//! inverse location <sensor> lat lon min_line max_line
//! → result           line pixel
//! → none
//! ```
//!
//! Angles are radians, positions meters. Write failures are logged and
//! otherwise ignored; tracing must never fail a location call.

use crate::{epoch::Epoch, sensor::SensorPixel};
use demgrid::GeodeticPoint;
use log::warn;
use nalgebra::Vector3;
use std::io::Write;

/// Consumer-enabled sink for location traces.
pub struct DumpSink {
    out: Box<dyn Write>,
}

impl DumpSink {
    /// Wraps any writer (a file, a buffer, standard error).
    pub fn new(out: Box<dyn Write>) -> Self {
        Self { out }
    }

    fn record(&mut self, line: std::fmt::Arguments<'_>) {
        if let Err(e) = writeln!(self.out, "{line}") {
            warn!("dump record dropped: {e}");
        }
    }

    pub(crate) fn direct_location(
        &mut self,
        date: Epoch,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        light_time: bool,
        aberration: bool,
        refraction: bool,
    ) {
        self.record(format_args!(
            "direct location  {date} {} {} {} {} {} {} lt:{light_time} ab:{aberration} ref:{refraction}",
            position.x, position.y, position.z, los.x, los.y, los.z,
        ));
    }

    pub(crate) fn inverse_location(
        &mut self,
        sensor: &str,
        latitude: f64,
        longitude: f64,
        min_line: f64,
        max_line: f64,
    ) {
        self.record(format_args!(
            "inverse location {sensor} {latitude} {longitude} {min_line} {max_line}"
        ));
    }

    pub(crate) fn result_point(&mut self, point: &GeodeticPoint) {
        self.record(format_args!(
            "→ result           {} {} {}",
            point.latitude, point.longitude, point.altitude
        ));
    }

    pub(crate) fn result_pixel(&mut self, pixel: Option<&SensorPixel>) {
        match pixel {
            Some(sp) => self.record(format_args!("→ result           {} {}", sp.line, sp.pixel)),
            None => self.record(format_args!("→ none")),
        }
    }
}
