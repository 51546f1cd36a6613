//! The dump sink record grammar.

use super::fixtures::fan_sensor;
use crate::{ConstantElevationAlgorithm, DumpSink, Ellipsoid, Engine, EngineBuilder, Epoch};
use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

#[derive(Clone)]
struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

fn traced_engine() -> (Engine, SharedBuffer) {
    let buffer = SharedBuffer(Rc::new(RefCell::new(Vec::new())));
    let ellipsoid = Ellipsoid::wgs84();
    let (pv, attitude) = super::fixtures::orbit(&ellipsoid, 61, 0.5);
    let provider = crate::SampledTrajectory::new(
        pv,
        attitude,
        crate::BodyRotation::frozen(Epoch::REFERENCE),
        crate::InterpolationConfig::default(),
    )
    .unwrap();
    let engine = EngineBuilder::new(ellipsoid)
        .provider(provider)
        .algorithm(ConstantElevationAlgorithm::new(0.0))
        .sensor(fan_sensor("line", 32, 1.43e-4, 0.0, 0.0, 200.0, 100.0))
        .light_time(false)
        .aberration(false)
        .dump(DumpSink::new(Box::new(buffer.clone())))
        .build()
        .unwrap();
    (engine, buffer)
}

#[test]
fn direct_and_inverse_records_follow_the_grammar() {
    let (mut engine, buffer) = traced_engine();
    let ground = engine.direct_location_line("line", 100.0).unwrap();
    let gp = ground[16];
    let sp = engine
        .inverse_location("line", gp.latitude, gp.longitude, 0.0, 200.0)
        .unwrap();
    assert!(sp.is_some());

    let bytes = buffer.0.borrow().clone();
    let text = String::from_utf8(bytes).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    // 32 direct records with their results, then one inverse pair
    assert_eq!(lines.len(), 2 * 32 + 2);

    let first = lines[0];
    assert!(first.starts_with("direct location  "), "{first:?}");
    assert!(first.ends_with("lt:false ab:false ref:false"), "{first:?}");
    let fields: Vec<&str> = first.split_whitespace().collect();
    // tag(2) + date + position(3) + los(3) + flags(3)
    assert_eq!(fields.len(), 12);
    assert!(Epoch::parse(fields[2]).is_some(), "bad date {:?}", fields[2]);

    let result = lines[1];
    assert!(result.starts_with("→ result"), "{result:?}");
    let numbers: Vec<f64> = result
        .split_whitespace()
        .skip(2)
        .map(|f| f.parse().unwrap())
        .collect();
    assert_eq!(numbers.len(), 3);
    assert!((numbers[0] - gp.latitude).abs() < 1.0);

    let inverse = lines[2 * 32];
    assert!(inverse.starts_with("inverse location line "), "{inverse:?}");
    let last = lines[2 * 32 + 1];
    assert!(last.starts_with("→ result"), "{last:?}");
}

#[test]
fn unseen_targets_trace_none() {
    let (mut engine, buffer) = traced_engine();
    let ground = engine.direct_location_line("line", 190.0).unwrap();
    let gp = ground[16];
    let sp = engine
        .inverse_location("line", gp.latitude, gp.longitude, 0.0, 40.0)
        .unwrap();
    assert!(sp.is_none());
    let bytes = buffer.0.borrow().clone();
    let text = String::from_utf8(bytes).unwrap();
    assert!(text.lines().last().unwrap().starts_with("→ none"));
}
