//! The driving field the sampler reads.

use nucleation_types::Point;

/// Field values at one sample point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSample {
    /// The scalar driving field (concentration-like).
    pub value: f64,
    /// The suppression field; nucleation is blocked where it is high.
    pub suppression: f64,
}

/// Source of field and suppression values at arbitrary points.
///
/// The physics solver that owns the real fields implements this. The
/// pipeline only ever reads it.
pub trait FieldSource<const D: usize> {
    /// Evaluate both fields at `point` and simulation time `time`.
    fn sample(&self, point: &Point<D>, time: f64) -> FieldSample;
}
