//! An analytic driving field with event-based suppression.
//!
//! The field peaks at the domain center and falls off linearly with
//! distance. The suppression field is 1 inside the radius of every logged
//! event whose hold period has elapsed, and 0 everywhere else.

use nucleation_core::event_log::EventLog;
use nucleation_core::field::{FieldSample, FieldSource};
use nucleation_types::Point;

/// A cone-shaped field centered in the domain.
#[derive(Debug, Clone, PartialEq)]
pub struct SupersaturatedField<const D: usize> {
    center: Point<D>,
    peak_value: f64,
    falloff: f64,
    /// Released nuclei as `(center, radius)`.
    seeded: Vec<(Point<D>, f64)>,
}

impl<const D: usize> SupersaturatedField<D> {
    /// A field over `[0, extents]` with the given peak and slope.
    pub fn new(extents: [f64; D], peak_value: f64, falloff: f64) -> Self {
        let mut center = extents;
        for c in &mut center {
            *c /= 2.0;
        }
        Self {
            center: Point::new(center),
            peak_value,
            falloff,
            seeded: Vec::new(),
        }
    }

    /// Refresh the suppression field from the events released by `time`.
    pub fn sync_with(&mut self, log: &EventLog<D>, time: f64) {
        self.seeded = log
            .released(time)
            .map(|event| (*event.center(), event.nucleus.radius))
            .collect();
    }

    /// Number of nuclei currently suppressing the field.
    pub const fn seeded_count(&self) -> usize {
        self.seeded.len()
    }
}

impl<const D: usize> FieldSource<D> for SupersaturatedField<D> {
    fn sample(&self, point: &Point<D>, _time: f64) -> FieldSample {
        let value = self.peak_value - self.falloff * self.center.distance(point);
        let suppressed = self
            .seeded
            .iter()
            .any(|(center, radius)| center.distance(point) <= *radius);
        FieldSample {
            value,
            suppression: if suppressed { 1.0 } else { 0.0 },
        }
    }
}
