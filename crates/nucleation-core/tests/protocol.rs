//! Multi-worker tests for the full nucleation pipeline.
//!
//! Every test wires an in-process [`ChannelWorld`] and drives all ranks
//! concurrently on one task, the way the engine does.

#![allow(
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_precision_loss,
    clippy::missing_panics_doc
)]

use futures::future::try_join_all;
use nucleation_comm::{ChannelCommunicator, ChannelWorld, Communicator, Payload, Tag};
use nucleation_core::config::{NucleationParams, SimulationConfig};
use nucleation_core::event_log::EventLog;
use nucleation_core::field::{FieldSample, FieldSource};
use nucleation_core::mesh::{CellId, LocalCell, MeshEngine, MeshError, QuadraturePoint};
use nucleation_core::step::{StepError, StepOutcome, WorkerState, run_nucleation_step};
use nucleation_core::wire::{WireError, WireField, recv_batch};
use nucleation_types::{Candidate, EventId, Point};
use rand::SeedableRng;
use rand::rngs::SmallRng;

// =============================================================================
// Stand-ins
// =============================================================================

/// Cells with one quadrature point each; refining a cell bumps its level.
#[derive(Debug)]
struct PointMesh {
    cells: Vec<LocalCell<2>>,
    flagged: Vec<CellId>,
    rebuilds: u32,
}

impl PointMesh {
    fn from_points(points: &[(f64, f64)], weight: f64) -> Self {
        let cells = points
            .iter()
            .enumerate()
            .map(|(i, (x, y))| LocalCell {
                id: CellId(u32::try_from(i).unwrap()),
                level: 0,
                points: vec![QuadraturePoint {
                    position: Point::new([*x, *y]),
                    weight,
                }],
            })
            .collect();
        Self {
            cells,
            flagged: Vec::new(),
            rebuilds: 0,
        }
    }

    /// The cells of an `n` x `n` grid on the unit square whose centers fall
    /// in this rank's strip along x.
    fn strip(rank: usize, size: usize, n: usize) -> Self {
        let h = 1.0 / n as f64;
        let points: Vec<(f64, f64)> = (0..n)
            .filter(|i| i * size / n == rank)
            .flat_map(|i| (0..n).map(move |j| ((i as f64 + 0.5) * h, (j as f64 + 0.5) * h)))
            .collect();
        Self::from_points(&points, h * h)
    }
}

impl MeshEngine<2> for PointMesh {
    fn local_cells(&self) -> Vec<LocalCell<2>> {
        self.cells.clone()
    }

    fn mark_for_refinement(&mut self, cell: CellId) -> Result<(), MeshError> {
        if self.cells.iter().any(|c| c.id == cell) {
            self.flagged.push(cell);
            Ok(())
        } else {
            Err(MeshError::UnknownCell { cell })
        }
    }

    fn apply_refinement(&mut self) -> Result<u64, MeshError> {
        self.rebuilds += 1;
        for cell in &mut self.cells {
            if self.flagged.contains(&cell.id) {
                cell.level += 1;
            }
        }
        self.flagged.clear();
        Ok(self.dof_count())
    }

    fn dof_count(&self) -> u64 {
        self.cells.iter().map(|c| 4_u64.pow(c.level)).sum()
    }
}

/// A spatially uniform field with no suppression.
struct Uniform(f64);

impl FieldSource<2> for Uniform {
    fn sample(&self, _point: &Point<2>, _time: f64) -> FieldSample {
        FieldSample {
            value: self.0,
            suppression: 0.0,
        }
    }
}

type Worker = WorkerState<PointMesh, SmallRng, 2>;

fn params(configure: impl FnOnce(&mut SimulationConfig)) -> NucleationParams<2> {
    let mut config = SimulationConfig::default();
    config.nucleation.k1 = 1.0e4;
    config.nucleation.k2 = 1.0;
    config.nucleation.saturation_floor = 0.1;
    config.nucleation.skip_steps = 1;
    config.nucleation.min_separation = 0.1;
    config.nucleation.freeze_radius = 0.03;
    config.time.timestep = 0.01;
    configure(&mut config);
    config.validate::<2>().unwrap()
}

fn world(size: usize) -> Vec<ChannelCommunicator> {
    ChannelWorld::new(size).unwrap().into_communicators()
}

async fn run_step(
    workers: &mut [Worker],
    comms: &[ChannelCommunicator],
    field: &Uniform,
    params: &NucleationParams<2>,
    step: u32,
) -> Result<Vec<StepOutcome<2>>, StepError> {
    let time = f64::from(step) * params.model.timestep;
    try_join_all(
        workers
            .iter_mut()
            .zip(comms)
            .map(|(worker, comm)| run_nucleation_step(worker, comm, field, params, step, time)),
    )
    .await
}

fn strip_workers(size: usize, seed: u64) -> Vec<Worker> {
    (0..size)
        .map(|rank| {
            WorkerState::new(
                PointMesh::strip(rank, size, 20),
                SmallRng::seed_from_u64(seed + rank as u64),
            )
        })
        .collect()
}

// =============================================================================
// Replication and invariants
// =============================================================================

#[tokio::test]
async fn replicas_agree_for_one_to_four_workers() {
    let params = params(|_| {});
    let field = Uniform(1.0);

    for size in 1..=4 {
        let comms = world(size);
        let mut workers = strip_workers(size, 17);

        for step in 0..6 {
            let outcomes = run_step(&mut workers, &comms, &field, &params, step)
                .await
                .unwrap();

            let batches: Vec<_> = outcomes
                .iter()
                .map(|o| o.summary().unwrap().accepted.clone())
                .collect();
            assert!(batches.windows(2).all(|w| w[0] == w[1]), "batches differ at step {step}");
        }

        let reference: &EventLog<2> = &workers[0].log;
        assert!(!reference.is_empty(), "no events with {size} workers");
        for worker in &workers {
            assert_eq!(&worker.log, reference);
        }
        reference.verify_ids().unwrap();
        reference.verify_separation(params.min_separation()).unwrap();
        let ids: Vec<u32> = reference.iter().map(|e| e.id.into_inner()).collect();
        let expected: Vec<u32> = (0..u32::try_from(reference.len()).unwrap()).collect();
        assert_eq!(ids, expected);
    }
}

#[tokio::test]
async fn only_the_resolver_rank_reports_merge_results() {
    let params = params(|_| {});
    let comms = world(3);
    let mut workers = strip_workers(3, 5);

    let outcomes = run_step(&mut workers, &comms, &Uniform(1.0), &params, 0)
        .await
        .unwrap();
    let summaries: Vec<_> = outcomes.iter().map(|o| o.summary().unwrap()).collect();

    assert!(summaries[0].merged.is_none());
    assert!(summaries[1].merged.is_none());
    let merged = summaries[2].merged.unwrap();
    let sampled: usize = summaries.iter().map(|s| s.sampling.accepted).sum();
    assert_eq!(merged, sampled);
    assert_eq!(merged, summaries[2].accepted.len() + summaries[2].conflicts.len());
}

// =============================================================================
// Ordering
// =============================================================================

/// A model that fires at every eligible point.
fn certain() -> NucleationParams<2> {
    params(|config| {
        config.nucleation.k1 = 1.0e12;
        config.nucleation.k2 = 0.0;
        config.nucleation.saturation_floor = 0.0;
        config.nucleation.boundary_margin = 0.0;
    })
}

#[tokio::test]
async fn merged_order_follows_rank_order() {
    let params = certain();
    let comms = world(4);
    let mut workers: Vec<Worker> = (0..4)
        .map(|rank| {
            let x = 0.2 + 0.15 * rank as f64;
            WorkerState::new(
                PointMesh::from_points(&[(x, 0.3), (x, 0.7)], 0.01),
                SmallRng::seed_from_u64(rank as u64),
            )
        })
        .collect();

    run_step(&mut workers, &comms, &Uniform(1.0), &params, 0)
        .await
        .unwrap();

    let centers: Vec<[f64; 2]> = workers[2].log.iter().map(|e| e.center().0).collect();
    let expected: Vec<[f64; 2]> = (0..4)
        .flat_map(|rank: u32| {
            let x = 0.2 + 0.15 * f64::from(rank);
            [[x, 0.3], [x, 0.7]]
        })
        .collect();
    assert_eq!(centers.len(), expected.len());
    for (got, want) in centers.iter().zip(&expected) {
        assert!((got[0] - want[0]).abs() < 1e-12 && (got[1] - want[1]).abs() < 1e-12);
    }
}

#[tokio::test]
async fn lower_rank_wins_a_cross_worker_conflict() {
    let params = certain();

    for (first, second) in [((0.3, 0.3), (0.35, 0.3)), ((0.35, 0.3), (0.3, 0.3))] {
        let comms = world(2);
        let mut workers = vec![
            WorkerState::new(PointMesh::from_points(&[first], 0.01), SmallRng::seed_from_u64(1)),
            WorkerState::new(PointMesh::from_points(&[second], 0.01), SmallRng::seed_from_u64(2)),
        ];

        let outcomes = run_step(&mut workers, &comms, &Uniform(1.0), &params, 0)
            .await
            .unwrap();

        let log = &workers[0].log;
        assert_eq!(log.len(), 1);
        assert_eq!(log.get(EventId(0)).unwrap().center(), &Point::new([first.0, first.1]));
        let conflicts = &outcomes[1].summary().unwrap().conflicts;
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].center, Point::new([second.0, second.1]));
        assert_eq!(workers[1].log, *log);
    }
}

// =============================================================================
// Single worker, schedule, refinement
// =============================================================================

#[tokio::test]
async fn single_worker_sends_no_messages() {
    let params = params(|_| {});
    let comms = world(1);
    let mut workers = strip_workers(1, 3);

    for step in 0..4 {
        run_step(&mut workers, &comms, &Uniform(1.0), &params, step)
            .await
            .unwrap();
    }

    assert_eq!(comms[0].sent_messages(), 0);
    assert!(!workers[0].log.is_empty());
}

#[tokio::test]
async fn off_schedule_steps_are_skipped() {
    let params = params(|config| config.nucleation.skip_steps = 4);
    let comms = world(2);
    let mut workers = strip_workers(2, 9);

    let outcomes = run_step(&mut workers, &comms, &Uniform(1.0), &params, 3)
        .await
        .unwrap();

    assert!(outcomes.iter().all(|o| matches!(o, StepOutcome::Skipped { step: 3 })));
    assert!(comms.iter().all(|c| c.sent_messages() == 0));
    assert!(workers.iter().all(|w| w.log.is_empty()));
}

#[tokio::test]
async fn refinement_only_touches_cells_near_new_events() {
    let params = params(|config| {
        config.nucleation.k1 = 1.0e12;
        config.nucleation.k2 = 0.0;
        config.nucleation.saturation_floor = 0.0;
        config.nucleation.freeze_radius = 0.05;
        config.refinement.min_level = 0;
        config.refinement.max_level = 1;
    });
    let comms = world(1);
    // The third point lies inside the boundary margin, so it is never a candidate.
    let mut workers = vec![WorkerState::new(
        PointMesh::from_points(&[(0.5, 0.5), (0.9, 0.5), (0.5, 0.01)], 0.01),
        SmallRng::seed_from_u64(4),
    )];

    let outcomes = run_step(&mut workers, &comms, &Uniform(1.0), &params, 0)
        .await
        .unwrap();
    let summary = outcomes[0].summary().unwrap();

    assert_eq!(summary.accepted.len(), 2);
    assert_eq!(summary.refinement.iterations, 1);
    assert_eq!(summary.refinement.marked_per_iteration, vec![2]);
    let levels: Vec<u32> = workers[0].mesh.cells.iter().map(|c| c.level).collect();
    assert_eq!(levels, vec![1, 1, 0]);
}

#[tokio::test]
async fn quiet_step_leaves_the_mesh_alone() {
    let params = params(|_| {});
    let comms = world(2);
    let mut workers = strip_workers(2, 21);

    // Below the saturation floor nothing can nucleate.
    run_step(&mut workers, &comms, &Uniform(0.05), &params, 0)
        .await
        .unwrap();

    assert!(workers.iter().all(|w| w.log.is_empty() && w.mesh.rebuilds == 0));
}

// =============================================================================
// Protocol violations
// =============================================================================

#[tokio::test]
async fn short_array_is_a_fatal_length_mismatch() {
    let comms = world(2);
    comms[0].send(1, Tag(0), Payload::Count(2)).await.unwrap();
    comms[0]
        .send(1, WireField::Id.tag::<2>(), Payload::Unsigned(vec![0]))
        .await
        .unwrap();

    let result = recv_batch::<_, Candidate<2>, 2>(&comms[1], 0).await;
    assert!(matches!(
        result,
        Err(WireError::LengthMismatch {
            field: WireField::Id,
            declared: 2,
            actual: 1,
            ..
        })
    ));
}

#[tokio::test]
async fn out_of_order_array_is_a_desync() {
    let comms = world(2);
    comms[0].send(1, Tag(0), Payload::Count(1)).await.unwrap();
    comms[0]
        .send(1, WireField::Radius.tag::<2>(), Payload::Double(vec![0.02]))
        .await
        .unwrap();

    let result = recv_batch::<_, Candidate<2>, 2>(&comms[1], 0).await;
    assert!(matches!(result, Err(WireError::Comm { .. })));
}
