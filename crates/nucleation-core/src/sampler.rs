//! Candidate sampling: one stochastic trial per eligible sample point.
//!
//! The sampler walks the worker's sample points in the order given,
//! decides eligibility (safety zone and suppression), draws once against
//! the nucleation probability, and keeps the point as a [`Candidate`] if
//! it is clear of every logged event and of every candidate kept earlier
//! in the same walk. It has no side effects besides consuming randomness.

use nucleation_types::{Candidate, Nucleus, Point, ProvisionalId};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event_log::EventLog;
use crate::field::FieldSource;
use crate::mesh::MeshEngine;
use crate::probability::ProbabilityModel;

/// Where the measure in the probability formula comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    /// Use each sample's own quadrature weight.
    Quadrature,
    /// Use the same cell measure for every sample.
    UniformGrid {
        /// `spacing^D` of the finest uniform grid.
        cell_measure: f64,
    },
}

impl Measure {
    /// The measure to use for a sample with quadrature weight `weight`.
    pub const fn resolve(&self, weight: f64) -> f64 {
        match *self {
            Self::Quadrature => weight,
            Self::UniformGrid { cell_measure } => cell_measure,
        }
    }
}

/// Eligibility and acceptance parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct SamplerParams<const D: usize> {
    /// Domain length along each axis, starting at the origin.
    pub extents: [f64; D],
    /// Per-axis periodicity; periodic axes have no boundary margin.
    pub periodic: [bool; D],
    /// Width of the excluded band along non-periodic boundaries.
    pub boundary_margin: f64,
    /// Minimum distance to any logged event or earlier candidate.
    pub min_separation: f64,
    /// Radius stamped on every candidate.
    pub event_radius: f64,
    /// Hold period stamped on every candidate.
    pub hold_duration: f64,
    /// Samples with suppression at or above this are ineligible.
    pub suppression_threshold: f64,
    /// Measure mode.
    pub measure: Measure,
}

impl<const D: usize> SamplerParams<D> {
    /// Whether `position` lies strictly inside the boundary margin on every
    /// non-periodic axis.
    pub fn in_safety_zone(&self, position: &Point<D>) -> bool {
        position
            .coords()
            .iter()
            .zip(self.extents.iter().zip(self.periodic.iter()))
            .all(|(x, (extent, periodic))| {
                *periodic || (self.boundary_margin < *x && *x < extent - self.boundary_margin)
            })
    }

    /// Whether a sample may be tried at all.
    pub fn is_eligible(&self, sample: &SamplePoint<D>) -> bool {
        sample.suppression < self.suppression_threshold && self.in_safety_zone(&sample.position)
    }
}

/// A sample location with the field values read there.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplePoint<const D: usize> {
    /// Physical position.
    pub position: Point<D>,
    /// Driving field value.
    pub field: f64,
    /// Suppression field value.
    pub suppression: f64,
    /// Quadrature weight (`JxW`).
    pub weight: f64,
}

/// Read the field at every quadrature point of every locally owned cell,
/// in cell order and then quadrature order.
pub fn collect_sample_points<const D: usize, M, F>(
    mesh: &M,
    field: &F,
    time: f64,
) -> Vec<SamplePoint<D>>
where
    M: MeshEngine<D>,
    F: FieldSource<D>,
{
    mesh.local_cells()
        .iter()
        .flat_map(|cell| cell.points.iter())
        .map(|point| {
            let values = field.sample(&point.position, time);
            SamplePoint {
                position: point.position,
                field: values.value,
                suppression: values.suppression,
                weight: point.weight,
            }
        })
        .collect()
}

/// Counters from one sampling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingReport {
    /// Sample points visited.
    pub checked: usize,
    /// Points that passed eligibility (one draw each).
    pub eligible: usize,
    /// Draws that came in at or under the probability.
    pub drawn: usize,
    /// Successful draws dropped for proximity to a logged event.
    pub near_history: usize,
    /// Successful draws dropped for proximity to an earlier candidate.
    pub near_local: usize,
    /// Candidates produced.
    pub accepted: usize,
}

/// Result of a sampling pass.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledBatch<const D: usize> {
    /// Candidates in traversal order, with provisional ids `0..n`.
    pub candidates: Vec<Candidate<D>>,
    /// Pass counters.
    pub report: SamplingReport,
}

/// Where in the run a sampling pass takes place.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleInstant {
    /// Simulation time.
    pub time: f64,
    /// Step index.
    pub step: u32,
}

/// Run one sampling pass over `samples`.
///
/// Exactly one uniform draw in `[0, 1)` is taken from `rng` for each
/// eligible sample, whether or not the draw later survives the proximity
/// checks.
pub fn sample_candidates<const D: usize, R: Rng + ?Sized>(
    samples: &[SamplePoint<D>],
    history: &EventLog<D>,
    model: &ProbabilityModel,
    params: &SamplerParams<D>,
    instant: SampleInstant,
    rng: &mut R,
) -> SampledBatch<D> {
    let mut report = SamplingReport::default();
    let mut candidates: Vec<Candidate<D>> = Vec::new();

    for sample in samples {
        report.checked = report.checked.saturating_add(1);
        if !params.is_eligible(sample) {
            continue;
        }
        report.eligible = report.eligible.saturating_add(1);

        let probability = model.probability(sample.field, params.measure.resolve(sample.weight));
        let draw: f64 = rng.random();
        if draw > probability {
            continue;
        }
        report.drawn = report.drawn.saturating_add(1);

        if !history.is_clear_of(&sample.position, params.min_separation) {
            report.near_history = report.near_history.saturating_add(1);
            continue;
        }
        let clear_of_local = candidates
            .iter()
            .all(|c| c.center().distance(&sample.position) >= params.min_separation);
        if !clear_of_local {
            report.near_local = report.near_local.saturating_add(1);
            continue;
        }

        let provisional_id = ProvisionalId(u32::try_from(candidates.len()).unwrap_or(u32::MAX));
        candidates.push(Candidate::new(
            provisional_id,
            Nucleus {
                center: sample.position,
                radius: params.event_radius,
                created_at: instant.time,
                hold_duration: params.hold_duration,
                created_step: instant.step,
            },
        ));
    }

    report.accepted = candidates.len();
    debug!(
        step = instant.step,
        checked = report.checked,
        eligible = report.eligible,
        drawn = report.drawn,
        near_history = report.near_history,
        near_local = report.near_local,
        accepted = report.accepted,
        "Sampling pass complete"
    );

    SampledBatch { candidates, report }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use nucleation_types::{EventId, NucleationEvent};
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;

    fn params() -> SamplerParams<2> {
        SamplerParams {
            extents: [1.0, 1.0],
            periodic: [false, false],
            boundary_margin: 0.05,
            min_separation: 0.1,
            event_radius: 0.02,
            hold_duration: 0.5,
            suppression_threshold: 0.1,
            measure: Measure::Quadrature,
        }
    }

    /// A model that always fires for any positive measure.
    fn certain() -> ProbabilityModel {
        ProbabilityModel {
            k1: 1.0e12,
            k2: 0.0,
            saturation_floor: 0.0,
            timestep: 1.0,
            skip_steps: 1,
        }
    }

    fn never() -> ProbabilityModel {
        ProbabilityModel {
            k1: 0.0,
            ..certain()
        }
    }

    fn sample(x: f64, y: f64) -> SamplePoint<2> {
        SamplePoint {
            position: Point::new([x, y]),
            field: 1.0,
            suppression: 0.0,
            weight: 1.0,
        }
    }

    const NOW: SampleInstant = SampleInstant {
        time: 2.5,
        step: 250,
    };

    #[test]
    fn safety_zone_is_strict() {
        let p = params();
        assert!(p.in_safety_zone(&Point::new([0.5, 0.5])));
        assert!(!p.in_safety_zone(&Point::new([0.05, 0.5])));
        assert!(!p.in_safety_zone(&Point::new([0.5, 0.95])));
        assert!(!p.in_safety_zone(&Point::new([0.01, 0.99])));
    }

    #[test]
    fn periodic_axis_has_no_margin() {
        let p = SamplerParams {
            periodic: [true, false],
            ..params()
        };
        assert!(p.in_safety_zone(&Point::new([0.0, 0.5])));
        assert!(!p.in_safety_zone(&Point::new([0.5, 0.0])));
    }

    #[test]
    fn suppressed_point_is_ineligible() {
        let mut s = sample(0.5, 0.5);
        s.suppression = 0.1;
        assert!(!params().is_eligible(&s));
        s.suppression = 0.099;
        assert!(params().is_eligible(&s));
    }

    #[test]
    fn certain_model_accepts_spaced_points_in_order() {
        let samples = [sample(0.2, 0.2), sample(0.5, 0.5), sample(0.8, 0.8)];
        let mut rng = SmallRng::seed_from_u64(7);
        let batch = sample_candidates(&samples, &EventLog::new(), &certain(), &params(), NOW, &mut rng);

        assert_eq!(batch.candidates.len(), 3);
        for (i, c) in batch.candidates.iter().enumerate() {
            assert_eq!(c.provisional_id, ProvisionalId(u32::try_from(i).unwrap()));
            assert_eq!(c.nucleus.created_step, 250);
            assert!((c.nucleus.created_at - 2.5).abs() < f64::EPSILON);
            assert!((c.nucleus.radius - 0.02).abs() < f64::EPSILON);
        }
        assert_eq!(batch.candidates[1].center(), &Point::new([0.5, 0.5]));
    }

    #[test]
    fn near_local_candidate_is_dropped() {
        let samples = [sample(0.5, 0.5), sample(0.55, 0.5), sample(0.7, 0.5)];
        let mut rng = SmallRng::seed_from_u64(1);
        let batch = sample_candidates(&samples, &EventLog::new(), &certain(), &params(), NOW, &mut rng);
        assert_eq!(batch.candidates.len(), 2);
        assert_eq!(batch.report.near_local, 1);
        assert_eq!(batch.report.drawn, 3);
    }

    #[test]
    fn near_history_is_dropped() {
        let history = EventLog::from_events(vec![NucleationEvent {
            id: EventId(0),
            nucleus: Nucleus {
                center: Point::new([0.5, 0.5]),
                radius: 0.02,
                created_at: 0.0,
                hold_duration: 0.0,
                created_step: 0,
            },
        }])
        .unwrap();
        let samples = [sample(0.52, 0.5), sample(0.8, 0.5)];
        let mut rng = SmallRng::seed_from_u64(3);
        let batch = sample_candidates(&samples, &history, &certain(), &params(), NOW, &mut rng);
        assert_eq!(batch.candidates.len(), 1);
        assert_eq!(batch.report.near_history, 1);
        assert_eq!(batch.candidates[0].center(), &Point::new([0.8, 0.5]));
    }

    #[test]
    fn zero_probability_yields_nothing() {
        let samples = [sample(0.3, 0.3), sample(0.6, 0.6)];
        let mut rng = SmallRng::seed_from_u64(5);
        let batch = sample_candidates(&samples, &EventLog::new(), &never(), &params(), NOW, &mut rng);
        assert!(batch.candidates.is_empty());
        assert_eq!(batch.report.eligible, 2);
    }

    #[test]
    fn one_draw_per_eligible_point() {
        // Two passes over the same eligible points with the same seed must
        // leave the generators in the same state regardless of outcome.
        let samples = [sample(0.3, 0.3), sample(0.01, 0.01), sample(0.6, 0.6)];
        let mut a = SmallRng::seed_from_u64(11);
        let mut b = SmallRng::seed_from_u64(11);
        sample_candidates(&samples, &EventLog::new(), &certain(), &params(), NOW, &mut a);
        sample_candidates(&samples, &EventLog::new(), &never(), &params(), NOW, &mut b);
        let next_a: u64 = a.random();
        let next_b: u64 = b.random();
        assert_eq!(next_a, next_b);
    }

    #[test]
    fn same_seed_same_candidates() {
        let model = ProbabilityModel {
            k1: 100.0,
            k2: 1.0,
            saturation_floor: 0.1,
            timestep: 0.5,
            skip_steps: 1,
        };
        let samples: Vec<SamplePoint<2>> = (1..10)
            .flat_map(|i| (1..10).map(move |j| sample(f64::from(i) * 0.1, f64::from(j) * 0.1)))
            .collect();
        let run = |seed| {
            let mut rng = SmallRng::seed_from_u64(seed);
            sample_candidates(&samples, &EventLog::new(), &model, &params(), NOW, &mut rng)
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn uniform_measure_ignores_weight() {
        let m = Measure::UniformGrid { cell_measure: 0.25 };
        assert!((m.resolve(9.0) - 0.25).abs() < f64::EPSILON);
        assert!((Measure::Quadrature.resolve(9.0) - 9.0).abs() < f64::EPSILON);
    }
}
