use crate::{
    dual::{DualSeed, DualVector3},
    epoch::Epoch,
    los::LosProvider,
};
use nalgebra::Vector3;

/// Monotone, differentiable mapping between line numbers and dates.
pub trait LineDatation {
    /// Acquisition date of (real-valued) line `line`.
    fn date(&self, line: f64) -> Epoch;

    /// Line acquired at `date`.
    fn line(&self, date: Epoch) -> f64;

    /// Local line rate, lines per second.
    fn rate(&self, line: f64) -> f64;
}

/// The reference datation: a constant line rate.
#[derive(Clone, Copy, Debug)]
pub struct LinearLineDatation {
    reference_date: Epoch,
    reference_line: f64,
    rate: f64,
}

impl LinearLineDatation {
    /// `rate` in lines per second, strictly positive.
    pub fn new(reference_date: Epoch, reference_line: f64, rate: f64) -> Self {
        Self {
            reference_date,
            reference_line,
            rate,
        }
    }
}

impl LineDatation for LinearLineDatation {
    fn date(&self, line: f64) -> Epoch {
        self.reference_date + (line - self.reference_line) / self.rate
    }

    fn line(&self, date: Epoch) -> f64 {
        self.reference_line + (date - self.reference_date) * self.rate
    }

    fn rate(&self, _line: f64) -> f64 {
        self.rate
    }
}

/// A sensor pixel coordinate: fractional line and pixel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorPixel {
    /// Fractional line number.
    pub line: f64,
    /// Fractional pixel index along the line.
    pub pixel: f64,
}

/// One pushbroom line sensor: a named fan of viewing directions with a
/// fixed mounting position and a line datation model.
pub struct LineSensor {
    name: String,
    position: Vector3<f64>,
    datation: Box<dyn LineDatation>,
    los: Box<dyn LosProvider>,
}

impl LineSensor {
    /// Builds a sensor. `position` is the mounting point in the
    /// spacecraft frame, constant over time.
    pub fn new(
        name: impl Into<String>,
        position: Vector3<f64>,
        datation: impl LineDatation + 'static,
        los: impl LosProvider + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            position,
            datation: Box::new(datation),
            los: Box::new(los),
        }
    }

    /// Sensor name, the registry key in the engine.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mounting position in the spacecraft frame.
    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    /// Number of pixels across the line.
    pub fn pixel_count(&self) -> usize {
        self.los.pixel_count()
    }

    /// Acquisition date of a line.
    pub fn date(&self, line: f64) -> Epoch {
        self.datation.date(line)
    }

    /// Line acquired at a date.
    pub fn line(&self, date: Epoch) -> f64 {
        self.datation.line(date)
    }

    /// Local line rate, lines per second.
    pub fn rate(&self, line: f64) -> f64 {
        self.datation.rate(line)
    }

    /// Unit line of sight of a pixel at a date, spacecraft frame.
    pub fn los(&self, index: usize, date: Epoch) -> Vector3<f64> {
        self.los.los(index, date)
    }

    /// Differentiable line of sight; partial slots follow the seed.
    pub fn los_dual(&self, index: usize, date: Epoch, seed: &DualSeed) -> DualVector3 {
        self.los.los_dual(index, date, seed)
    }
}
