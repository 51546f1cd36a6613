//! The georeferencing facade: direct and inverse location.

use crate::{
    correction::{aberration_of_light, SPEED_OF_LIGHT},
    crossing::{locate_pixel, refine_pixel, MeanPlaneCrossing},
    dump::DumpSink,
    ellipsoid::Ellipsoid,
    epoch::Epoch,
    intersection::IntersectionAlgorithm,
    refraction::{CorrectionGrid, RefractionModel},
    sensor::{LineSensor, SensorPixel},
    trajectory::TransformProvider,
    transform::Transform,
    PushbroomError,
};
use demgrid::GeodeticPoint;
use nalgebra::Vector3;
use std::collections::HashMap;

/// Crossing-solver accuracy at the mean-plane stage, lines.
const CROSSING_ACCURACY: f64 = 1.0e-2;

/// Evaluation budget of the crossing and pixel solvers.
const MAX_EVALUATIONS: usize = 50;

/// Brent accuracy of the coarse along-line pixel search, pixels.
const COARSE_PIXEL_ACCURACY: f64 = 1.0e-4;

type RangeKey = (String, u64, u64);

fn range_key(sensor: &str, min_line: f64, max_line: f64) -> RangeKey {
    (sensor.to_string(), min_line.to_bits(), max_line.to_bits())
}

struct Refraction {
    model: Box<dyn RefractionModel>,
    pixel_samples: usize,
    line_samples: usize,
    grids: HashMap<RangeKey, CorrectionGrid>,
}

/// Builder of [`Engine`].
pub struct EngineBuilder {
    ellipsoid: Ellipsoid,
    provider: Option<Box<dyn TransformProvider>>,
    algorithm: Option<Box<dyn IntersectionAlgorithm>>,
    sensors: Vec<LineSensor>,
    light_time: bool,
    aberration: bool,
    refraction: Option<Refraction>,
    dump: Option<DumpSink>,
}

impl EngineBuilder {
    /// Starts a builder; both corrections default to enabled.
    pub fn new(ellipsoid: Ellipsoid) -> Self {
        Self {
            ellipsoid,
            provider: None,
            algorithm: None,
            sensors: Vec::new(),
            light_time: true,
            aberration: true,
            refraction: None,
            dump: None,
        }
    }

    /// The spacecraft/body transform provider.
    #[must_use]
    pub fn provider(mut self, provider: impl TransformProvider + 'static) -> Self {
        self.provider = Some(Box::new(provider));
        self
    }

    /// The ray/DEM intersection algorithm.
    #[must_use]
    pub fn algorithm(mut self, algorithm: impl IntersectionAlgorithm + 'static) -> Self {
        self.algorithm = Some(Box::new(algorithm));
        self
    }

    /// Registers a line sensor under its name.
    #[must_use]
    pub fn sensor(mut self, sensor: LineSensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    /// Enables or disables light-time compensation.
    #[must_use]
    pub fn light_time(mut self, enabled: bool) -> Self {
        self.light_time = enabled;
        self
    }

    /// Enables or disables the aberration-of-light correction.
    #[must_use]
    pub fn aberration(mut self, enabled: bool) -> Self {
        self.aberration = enabled;
        self
    }

    /// Enables atmospheric refraction with a correction grid sampled on
    /// `pixel_samples × line_samples` sensor coordinates.
    #[must_use]
    pub fn refraction(
        mut self,
        model: impl RefractionModel + 'static,
        pixel_samples: usize,
        line_samples: usize,
    ) -> Self {
        self.refraction = Some(Refraction {
            model: Box::new(model),
            pixel_samples,
            line_samples,
            grids: HashMap::new(),
        });
        self
    }

    /// Enables the trace sink.
    #[must_use]
    pub fn dump(mut self, sink: DumpSink) -> Self {
        self.dump = Some(sink);
        self
    }

    /// Finishes the engine.
    pub fn build(self) -> Result<Engine, PushbroomError> {
        let provider = self
            .provider
            .ok_or(PushbroomError::Internal("engine without transform provider"))?;
        let algorithm = self
            .algorithm
            .ok_or(PushbroomError::Internal("engine without intersection algorithm"))?;
        let mut sensors = HashMap::new();
        for sensor in self.sensors {
            sensors.insert(sensor.name().to_string(), sensor);
        }
        Ok(Engine {
            ellipsoid: self.ellipsoid,
            provider,
            algorithm,
            sensors,
            light_time: self.light_time,
            aberration: self.aberration,
            refraction: self.refraction,
            crossings: HashMap::new(),
            dump: self.dump,
        })
    }
}

/// One georeferencing engine instance.
///
/// Owns one tile cache (inside the algorithm), one transform memo
/// (inside the provider) and one set of sensors; single-threaded by
/// design. Consumers wanting concurrency allocate one engine per
/// thread.
pub struct Engine {
    ellipsoid: Ellipsoid,
    provider: Box<dyn TransformProvider>,
    algorithm: Box<dyn IntersectionAlgorithm>,
    sensors: HashMap<String, LineSensor>,
    light_time: bool,
    aberration: bool,
    refraction: Option<Refraction>,
    crossings: HashMap<RangeKey, MeanPlaneCrossing>,
    dump: Option<DumpSink>,
}

impl Engine {
    /// The reference ellipsoid.
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Spacecraft-to-inertial transform at `date`.
    pub fn sc_to_inertial(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        self.provider.sc_to_inertial(date)
    }

    /// Inertial-to-body transform at `date`.
    pub fn inertial_to_body(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        self.provider.inertial_to_body(date)
    }

    /// Body-to-inertial transform at `date`.
    pub fn body_to_inertial(&mut self, date: Epoch) -> Result<Transform, PushbroomError> {
        self.provider.body_to_inertial(date)
    }

    /// DEM elevation at a point, through the intersection algorithm.
    pub fn elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PushbroomError> {
        self.algorithm.elevation(latitude, longitude)
    }

    /// Ground points seen by every pixel of `line`. Aborts on the first
    /// failing pixel.
    pub fn direct_location_line(
        &mut self,
        sensor_name: &str,
        line: f64,
    ) -> Result<Vec<GeodeticPoint>, PushbroomError> {
        let (date, position, sights) = {
            let sensor = self.sensor(sensor_name)?;
            let date = sensor.date(line);
            let sights: Vec<Vector3<f64>> =
                (0..sensor.pixel_count()).map(|i| sensor.los(i, date)).collect();
            (date, sensor.position(), sights)
        };
        sights
            .iter()
            .map(|los| self.direct_location(date, &position, los))
            .collect()
    }

    /// Ground point seen along one line of sight.
    ///
    /// `position` is the sensor mounting point and `los` the viewing
    /// direction, both in the spacecraft frame at `date`.
    pub fn direct_location(
        &mut self,
        date: Epoch,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<GeodeticPoint, PushbroomError> {
        if let Some(sink) = self.dump.as_mut() {
            sink.direct_location(
                date,
                position,
                los,
                self.light_time,
                self.aberration,
                self.refraction.is_some(),
            );
        }
        let (raw, position_body, los_body) = self.direct_location_raw(date, position, los)?;
        let result = match self.refraction.as_ref() {
            Some(refraction) => refraction.model.apply(
                &position_body,
                &los_body,
                &raw,
                &mut *self.algorithm,
                &self.ellipsoid,
            )?,
            None => raw,
        };
        if let Some(sink) = self.dump.as_mut() {
            sink.result_point(&result);
        }
        Ok(result)
    }

    /// Sensor coordinates seeing a ground point, or `None` when the
    /// point is not seen within `[min_line, max_line]`. The ground
    /// point's altitude is read from the DEM.
    pub fn inverse_location(
        &mut self,
        sensor_name: &str,
        latitude: f64,
        longitude: f64,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<SensorPixel>, PushbroomError> {
        if let Some(sink) = self.dump.as_mut() {
            sink.inverse_location(sensor_name, latitude, longitude, min_line, max_line);
        }
        let raw = self.inverse_location_raw(sensor_name, latitude, longitude, min_line, max_line)?;
        let result = match (raw, self.refraction.is_some()) {
            (Some(sp0), true) => {
                self.ensure_refraction_grid(sensor_name, min_line, max_line)?;
                let key = range_key(sensor_name, min_line, max_line);
                let grid = self
                    .refraction
                    .as_ref()
                    .and_then(|r| r.grids.get(&key))
                    .ok_or(PushbroomError::Internal("refraction grid missing"))?;
                Some(grid.fixed_point(sp0)?)
            }
            (raw, _) => raw,
        };
        if let Some(sink) = self.dump.as_mut() {
            sink.result_pixel(result.as_ref());
        }
        Ok(result)
    }

    /// Acquisition date of the line seeing a ground point.
    pub fn date_location(
        &mut self,
        sensor_name: &str,
        latitude: f64,
        longitude: f64,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<Epoch>, PushbroomError> {
        match self.inverse_location(sensor_name, latitude, longitude, min_line, max_line)? {
            Some(sp) => {
                let sensor = self.sensor(sensor_name)?;
                Ok(Some(sensor.date(sp.line)))
            }
            None => Ok(None),
        }
    }

    fn sensor(&self, name: &str) -> Result<&LineSensor, PushbroomError> {
        self.sensors
            .get(name)
            .ok_or_else(|| PushbroomError::UnknownSensor(name.to_string()))
    }

    /// The correction pipeline around the intersector, without
    /// refraction: aberration bends the inertial line of sight, light
    /// time shifts the inertial-to-body transform by the photon travel
    /// time in two fixed-point passes. Also returns the body-frame ray
    /// for the refraction stage.
    fn direct_location_raw(
        &mut self,
        date: Epoch,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<(GeodeticPoint, Vector3<f64>, Vector3<f64>), PushbroomError> {
        let sc_to_inertial = self.provider.sc_to_inertial(date)?;
        let inertial_to_body = self.provider.inertial_to_body(date)?;

        let position_inertial = sc_to_inertial.position(position);
        let velocity_inertial = sc_to_inertial.velocity_of(position, &Vector3::zeros());
        let raw_los_inertial = sc_to_inertial.vector(los);
        let los_inertial = if self.aberration {
            aberration_of_light(&raw_los_inertial, &velocity_inertial)
        } else {
            raw_los_inertial
        };

        let (position_body, los_body) = if self.light_time {
            // first pass against the ellipsoid for a travel-time seed
            let position_body = inertial_to_body.position(&position_inertial);
            let los_body = inertial_to_body.vector(&los_inertial);
            let seed = self
                .ellipsoid
                .point_on_ground(&position_body, &los_body, 0.0, 0.0)?;
            let delay1 =
                (self.ellipsoid.cartesian(&seed) - position_body).norm() / SPEED_OF_LIGHT;
            let shifted1 = inertial_to_body.shifted_by(-delay1);
            let gp1 = self.algorithm.intersection(
                &self.ellipsoid,
                &shifted1.position(&position_inertial),
                &shifted1.vector(&los_inertial),
            )?;
            // second pass with the travel time to the DEM point
            let delay2 =
                (self.ellipsoid.cartesian(&gp1) - position_body).norm() / SPEED_OF_LIGHT;
            let shifted2 = inertial_to_body.shifted_by(-delay2);
            (
                shifted2.position(&position_inertial),
                shifted2.vector(&los_inertial),
            )
        } else {
            (
                inertial_to_body.position(&position_inertial),
                inertial_to_body.vector(&los_inertial),
            )
        };

        let guess = self
            .algorithm
            .intersection(&self.ellipsoid, &position_body, &los_body)?;
        let refined =
            self.algorithm
                .refine_intersection(&self.ellipsoid, &position_body, &los_body, &guess)?;
        Ok((refined, position_body, los_body))
    }

    fn inverse_location_raw(
        &mut self,
        sensor_name: &str,
        latitude: f64,
        longitude: f64,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<SensorPixel>, PushbroomError> {
        let elevation = self.algorithm.elevation(latitude, longitude)?;
        let target = self
            .ellipsoid
            .cartesian(&GeodeticPoint::new(latitude, longitude, elevation));

        let key = range_key(sensor_name, min_line, max_line);
        let sensor = self
            .sensors
            .get(sensor_name)
            .ok_or_else(|| PushbroomError::UnknownSensor(sensor_name.to_string()))?;
        if !self.crossings.contains_key(&key) {
            let crossing = MeanPlaneCrossing::new(
                sensor,
                min_line,
                max_line,
                self.light_time,
                self.aberration,
                CROSSING_ACCURACY,
                MAX_EVALUATIONS,
            )?;
            self.crossings.insert(key.clone(), crossing);
        }
        let crossing = self
            .crossings
            .get_mut(&key)
            .ok_or(PushbroomError::Internal("crossing finder vanished"))?;

        let Some(result) = crossing.find(&target, sensor, &mut *self.provider)? else {
            return Ok(None);
        };
        let Some(coarse) = locate_pixel(
            sensor,
            &crossing.normal(),
            &result,
            COARSE_PIXEL_ACCURACY,
            MAX_EVALUATIONS,
        ) else {
            return Ok(None);
        };
        Ok(refine_pixel(sensor, &result, coarse))
    }

    /// Builds the refraction correction grid for one sensor and line
    /// range: direct locations with refraction on a sparse sensor grid,
    /// inverse locations (refraction off) of the resulting ground
    /// points, the difference bilinearly interpolated in between.
    fn ensure_refraction_grid(
        &mut self,
        sensor_name: &str,
        min_line: f64,
        max_line: f64,
    ) -> Result<(), PushbroomError> {
        let key = range_key(sensor_name, min_line, max_line);
        let (pixel_samples, line_samples) = match self.refraction.as_ref() {
            None => return Ok(()),
            Some(r) if r.grids.contains_key(&key) => return Ok(()),
            Some(r) => (r.pixel_samples.max(2), r.line_samples.max(2)),
        };
        let pixel_count = self.sensor(sensor_name)?.pixel_count();

        let mut pixel_indices: Vec<usize> = (0..pixel_samples)
            .map(|k| k * (pixel_count - 1) / (pixel_samples - 1))
            .collect();
        pixel_indices.dedup();
        let line_axis: Vec<f64> = (0..line_samples)
            .map(|k| min_line + (max_line - min_line) * k as f64 / (line_samples - 1) as f64)
            .collect();

        let mut pixel_corrections = Vec::with_capacity(pixel_indices.len() * line_axis.len());
        let mut line_corrections = Vec::with_capacity(pixel_indices.len() * line_axis.len());
        for &line in &line_axis {
            for &pixel in &pixel_indices {
                let ground = self.direct_location_of(sensor_name, line, pixel)?;
                let seen = self
                    .inverse_location_raw(
                        sensor_name,
                        ground.latitude,
                        ground.longitude,
                        min_line,
                        max_line,
                    )?
                    .ok_or(PushbroomError::Internal(
                        "refraction grid point not seen by the sensor",
                    ))?;
                pixel_corrections.push(pixel as f64 - seen.pixel);
                line_corrections.push(line - seen.line);
            }
        }

        let grid = CorrectionGrid::new(
            pixel_indices.iter().map(|&p| p as f64).collect(),
            line_axis,
            pixel_corrections,
            line_corrections,
        )?;
        if let Some(r) = self.refraction.as_mut() {
            r.grids.insert(key, grid);
        }
        Ok(())
    }

    fn direct_location_of(
        &mut self,
        sensor_name: &str,
        line: f64,
        pixel: usize,
    ) -> Result<GeodeticPoint, PushbroomError> {
        let (date, position, los) = {
            let sensor = self.sensor(sensor_name)?;
            let date = sensor.date(line);
            (date, sensor.position(), sensor.los(pixel, date))
        };
        self.direct_location(date, &position, &los)
    }
}
