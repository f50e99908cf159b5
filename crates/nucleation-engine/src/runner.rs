//! Drives every worker of an in-process world through the configured steps.
//!
//! Each rank gets its own [`GridMesh`] strip, its own copy of the field,
//! its own seeded random source, and its own event log. All ranks run the
//! same step concurrently on one task; after the last step the replicas
//! are compared and the shared log is audited.

use futures::future::try_join_all;
use nucleation_comm::ChannelWorld;
use nucleation_core::config::SimulationConfig;
use nucleation_core::event_log::EventLog;
use nucleation_core::mesh::MeshEngine;
use nucleation_core::step::{WorkerState, run_nucleation_step};
use nucleation_grid::{GridMesh, SupersaturatedField};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Result of a complete run.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationResult<const D: usize> {
    /// The agreed event log.
    pub log: EventLog<D>,
    /// Steps executed.
    pub total_steps: u32,
    /// Steps on which the nucleation pipeline ran.
    pub pipeline_runs: u32,
    /// Candidates dropped by the resolver over the whole run.
    pub conflicts: usize,
    /// Final degree-of-freedom count of each rank's strip.
    pub final_dofs: Vec<u64>,
    /// Final active cell count of each rank's strip.
    pub final_cells: Vec<usize>,
    /// Finest cell level reached on each rank (`None` for an empty strip).
    pub finest_levels: Vec<Option<u32>>,
    /// Messages sent by each rank.
    pub messages_sent: Vec<u64>,
}

type Worker<const D: usize> = WorkerState<GridMesh<D>, SmallRng, D>;

/// Run the configured number of steps with `run.workers` ranks.
///
/// # Errors
///
/// Returns [`EngineError`] if the configuration is invalid, any step
/// fails on any rank, or the replicas disagree at the end.
pub async fn run_simulation<const D: usize>(
    config: &SimulationConfig,
) -> Result<SimulationResult<D>, EngineError> {
    let params = config.validate::<D>()?;
    let size = config.run.workers;
    let comms = ChannelWorld::new(size)?.into_communicators();

    let mut workers: Vec<Worker<D>> = Vec::with_capacity(size);
    let mut fields = Vec::with_capacity(size);
    for rank in 0..size {
        let mesh = GridMesh::new(
            params.sampler.extents,
            params.refinement.min_level,
            params.refinement.max_level,
            rank,
            size,
        )?;
        workers.push(WorkerState::new(mesh, worker_rng(config.run.seed, rank)));
        fields.push(SupersaturatedField::new(
            params.sampler.extents,
            config.field.peak_value,
            config.field.falloff,
        ));
    }

    info!(
        workers = size,
        steps = config.time.steps,
        skip_steps = params.model.skip_steps,
        dimension = D,
        "Workers initialized, entering step loop"
    );

    let mut clock = params.clock();
    let mut pipeline_runs: u32 = 0;
    let mut conflicts: usize = 0;

    for _ in 0..config.time.steps {
        let step = clock.step();
        let time = clock.time();

        if clock.is_nucleation_step() {
            for (field, worker) in fields.iter_mut().zip(&workers) {
                field.sync_with(&worker.log, time);
            }

            let outcomes = try_join_all(workers.iter_mut().zip(&comms).zip(&fields).map(
                |((worker, comm), field)| {
                    run_nucleation_step(worker, comm, field, &params, step, time)
                },
            ))
            .await?;

            pipeline_runs = pipeline_runs.saturating_add(1);
            conflicts = outcomes
                .iter()
                .filter_map(|outcome| outcome.summary())
                .map(|summary| summary.conflicts.len())
                .fold(conflicts, usize::saturating_add);
            let suppressing = fields
                .first()
                .map_or(0, SupersaturatedField::seeded_count);
            debug!(step, time, suppressing, "Pipeline step finished");
        }

        clock.advance()?;
    }

    let log = verify_replicas(&workers)?;
    log.verify_ids()?;
    log.verify_separation(params.min_separation())?;

    Ok(SimulationResult {
        log,
        total_steps: clock.step(),
        pipeline_runs,
        conflicts,
        final_dofs: workers.iter().map(|w| w.mesh.dof_count()).collect(),
        final_cells: workers.iter().map(|w| w.mesh.active_cells()).collect(),
        finest_levels: workers.iter().map(|w| w.mesh.finest_level()).collect(),
        messages_sent: comms.iter().map(|c| c.sent_messages()).collect(),
    })
}

/// Worker-private random source: `seed + rank` when seeded, OS entropy
/// otherwise.
fn worker_rng(seed: Option<u64>, rank: usize) -> SmallRng {
    match seed {
        Some(base) => {
            SmallRng::seed_from_u64(base.wrapping_add(u64::try_from(rank).unwrap_or(u64::MAX)))
        }
        None => SmallRng::from_os_rng(),
    }
}

/// Check that every rank holds rank 0's log and return a copy of it.
fn verify_replicas<const D: usize>(workers: &[Worker<D>]) -> Result<EventLog<D>, EngineError> {
    let Some(reference) = workers.first().map(|w| &w.log) else {
        return Ok(EventLog::new());
    };
    for (rank, worker) in workers.iter().enumerate().skip(1) {
        if worker.log != *reference {
            return Err(EngineError::ReplicaMismatch {
                rank,
                len: worker.log.len(),
                reference_len: reference.len(),
            });
        }
    }
    Ok(reference.clone())
}

/// Log the final run summary.
pub fn log_simulation_end<const D: usize>(result: &SimulationResult<D>) {
    info!(
        total_steps = result.total_steps,
        pipeline_runs = result.pipeline_runs,
        events = result.log.len(),
        conflicts = result.conflicts,
        final_dofs = ?result.final_dofs,
        final_cells = ?result.final_cells,
        finest_levels = ?result.finest_levels,
        messages_sent = ?result.messages_sent,
        "Simulation ended"
    );

    if result.log.is_empty() {
        warn!("Run finished without any nucleation events");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn config(workers: usize) -> SimulationConfig {
        let mut config = SimulationConfig::default();
        config.nucleation.k1 = 1.0e5;
        config.nucleation.skip_steps = 5;
        config.refinement.min_level = 3;
        config.refinement.max_level = 4;
        config.time.steps = 20;
        config.run.workers = workers;
        config.run.seed = Some(7);
        config
    }

    #[tokio::test]
    async fn multi_worker_run_agrees_and_audits() {
        let result = run_simulation::<2>(&config(3)).await.unwrap();
        assert_eq!(result.total_steps, 20);
        assert_eq!(result.pipeline_runs, 4);
        assert!(!result.log.is_empty());
        assert_eq!(result.final_dofs.len(), 3);
        assert_eq!(result.final_cells.len(), 3);
        assert!(
            result
                .finest_levels
                .iter()
                .all(|l| l.is_some_and(|level| (3..=4).contains(&level)))
        );
        assert!(result.messages_sent.iter().any(|m| *m > 0));
    }

    #[tokio::test]
    async fn seeded_runs_are_reproducible() {
        let a = run_simulation::<2>(&config(2)).await.unwrap();
        let b = run_simulation::<2>(&config(2)).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn single_worker_run_sends_nothing() {
        let result = run_simulation::<2>(&config(1)).await.unwrap();
        assert_eq!(result.messages_sent, vec![0]);
        // Events were accepted, so refinement reached the finest level.
        assert_eq!(result.finest_levels, vec![Some(4)]);
        assert!(result.final_cells[0] > 64);
        assert!(!result.log.is_empty());
    }

    #[tokio::test]
    async fn three_dimensional_run() {
        let mut config = config(2);
        config.domain.extents = vec![1.0, 1.0, 1.0];
        config.refinement.min_level = 2;
        config.refinement.max_level = 3;
        let result = run_simulation::<3>(&config).await.unwrap();
        result.log.verify_separation(0.1).unwrap();
    }

    #[tokio::test]
    async fn dimension_mismatch_is_a_config_error() {
        let result = run_simulation::<3>(&config(2)).await;
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn replicas_that_differ_are_reported() {
        let mut workers: Vec<Worker<2>> = (0..2)
            .map(|rank| {
                WorkerState::new(
                    GridMesh::new([1.0, 1.0], 1, 1, rank, 2).unwrap(),
                    worker_rng(Some(0), rank),
                )
            })
            .collect();
        assert!(verify_replicas(&workers).is_ok());

        let event = nucleation_types::NucleationEvent {
            id: nucleation_types::EventId(0),
            nucleus: nucleation_types::Nucleus {
                center: nucleation_types::Point::new([0.5, 0.5]),
                radius: 0.02,
                created_at: 0.0,
                hold_duration: 0.0,
                created_step: 0,
            },
        };
        workers.get_mut(1).unwrap().log.append_batch(vec![event]).unwrap();
        assert!(matches!(
            verify_replicas(&workers),
            Err(EngineError::ReplicaMismatch { rank: 1, len: 1, reference_len: 0 })
        ));
    }
}
