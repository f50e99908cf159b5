//! One nucleation step: the generate, merge, resolve, disseminate, and
//! refine pipeline.
//!
//! Every worker calls [`run_nucleation_step`] with the same step index. The
//! phases are:
//!
//! 1. **Schedule** -- skip unless the step is a multiple of `skip_steps`.
//! 2. **Sample** -- read the field at every locally owned quadrature point
//!    and draw candidates.
//! 3. **Relay** -- move all candidates to the last rank, in rank order.
//! 4. **Resolve** -- on the last rank only, drop candidates too close to an
//!    earlier one and assign canonical ids.
//! 5. **Disseminate** -- broadcast the resolved batch to every rank.
//! 6. **Append** -- extend the local replica of the event log.
//! 7. **Refine** -- refine local cells near the new events.
//!
//! Phases 3 to 5 are rendezvous points: every rank must reach them.

use nucleation_comm::{CommError, Communicator};
use nucleation_types::NucleationEvent;
use rand::Rng;
use tracing::{Instrument, info, info_span};

use crate::config::NucleationParams;
use crate::disseminate::disseminate;
use crate::event_log::{EventLog, LogError};
use crate::field::FieldSource;
use crate::mesh::{MeshEngine, MeshError};
use crate::refinement::{RefinementReport, refine_near_events};
use crate::relay::relay_candidates;
use crate::resolver::{ConflictRecord, resolve_conflicts};
use crate::sampler::{SampleInstant, SamplingReport, collect_sample_points, sample_candidates};
use crate::schedule::is_nucleation_step;
use crate::wire::WireError;

/// Errors that abort a nucleation step. None of them are recoverable.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    /// Moving a batch failed.
    #[error("wire error: {source}")]
    Wire {
        /// The underlying wire error.
        #[from]
        source: WireError,
    },

    /// The transport failed outside a batch transfer.
    #[error("communication error: {source}")]
    Comm {
        /// The underlying communicator error.
        #[from]
        source: CommError,
    },

    /// The event log rejected the batch.
    #[error("event log error: {source}")]
    Log {
        /// The underlying log error.
        #[from]
        source: LogError,
    },

    /// The mesh engine failed.
    #[error("mesh error: {source}")]
    Mesh {
        /// The underlying mesh error.
        #[from]
        source: MeshError,
    },
}

/// Everything one worker owns across steps.
#[derive(Debug)]
pub struct WorkerState<M, R, const D: usize> {
    /// This worker's replica of the accepted event log.
    pub log: EventLog<D>,
    /// This worker's part of the mesh.
    pub mesh: M,
    /// Worker-private random source.
    pub rng: R,
}

impl<M, R, const D: usize> WorkerState<M, R, D> {
    /// A worker with an empty log.
    pub const fn new(mesh: M, rng: R) -> Self {
        Self {
            log: EventLog::new(),
            mesh,
            rng,
        }
    }
}

/// What one completed step did on this worker.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSummary<const D: usize> {
    /// Step index.
    pub step: u32,
    /// Simulation time.
    pub time: f64,
    /// Local sampling counters.
    pub sampling: SamplingReport,
    /// Size of the merged batch, on the resolver rank only.
    pub merged: Option<usize>,
    /// Conflicts found, on the resolver rank only.
    pub conflicts: Vec<ConflictRecord<D>>,
    /// Events appended to the log this step.
    pub accepted: Vec<NucleationEvent<D>>,
    /// Local refinement outcome.
    pub refinement: RefinementReport,
}

/// Result of [`run_nucleation_step`].
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome<const D: usize> {
    /// The step is not a nucleation step.
    Skipped {
        /// Step index.
        step: u32,
    },
    /// The pipeline ran.
    Completed(StepSummary<D>),
}

impl<const D: usize> StepOutcome<D> {
    /// The summary, if the pipeline ran.
    pub const fn summary(&self) -> Option<&StepSummary<D>> {
        match self {
            Self::Skipped { .. } => None,
            Self::Completed(summary) => Some(summary),
        }
    }
}

/// Run the nucleation pipeline for `step` on this worker.
///
/// # Errors
///
/// Returns [`StepError`] on any transport, wire, log, or mesh failure.
/// The replicas may be inconsistent after an error; the run must stop.
pub async fn run_nucleation_step<C, F, M, R, const D: usize>(
    state: &mut WorkerState<M, R, D>,
    comm: &C,
    field: &F,
    params: &NucleationParams<D>,
    step: u32,
    time: f64,
) -> Result<StepOutcome<D>, StepError>
where
    C: Communicator,
    F: FieldSource<D>,
    M: MeshEngine<D>,
    R: Rng,
{
    if !is_nucleation_step(step, params.model.skip_steps) {
        return Ok(StepOutcome::Skipped { step });
    }

    let span = info_span!("nucleation_step", rank = comm.rank(), step);
    run_pipeline(state, comm, field, params, SampleInstant { time, step })
        .instrument(span)
        .await
        .map(StepOutcome::Completed)
}

async fn run_pipeline<C, F, M, R, const D: usize>(
    state: &mut WorkerState<M, R, D>,
    comm: &C,
    field: &F,
    params: &NucleationParams<D>,
    instant: SampleInstant,
) -> Result<StepSummary<D>, StepError>
where
    C: Communicator,
    F: FieldSource<D>,
    M: MeshEngine<D>,
    R: Rng,
{
    let points = collect_sample_points(&state.mesh, field, instant.time);
    let sampled = sample_candidates(
        &points,
        &state.log,
        &params.model,
        &params.sampler,
        instant,
        &mut state.rng,
    );

    let held = relay_candidates(comm, sampled.candidates).await?;

    let root = comm.last_rank();
    let (resolved, merged, conflicts) = if comm.rank() == root {
        let merged = held.len();
        let resolution = resolve_conflicts(held, state.log.next_id()?, params.min_separation())?;
        (Some(resolution.accepted), Some(merged), resolution.conflicts)
    } else {
        (None, None, Vec::new())
    };

    let accepted = disseminate(comm, root, resolved).await?;
    state.log.append_batch(accepted.clone())?;

    let refinement = refine_near_events(&mut state.mesh, &accepted, &params.refinement)?;

    if !accepted.is_empty() {
        info!(
            accepted = accepted.len(),
            conflicts = conflicts.len(),
            total = state.log.len(),
            "Nucleation step complete"
        );
    }

    Ok(StepSummary {
        step: instant.step,
        time: instant.time,
        sampling: sampled.report,
        merged,
        conflicts,
        accepted,
        refinement,
    })
}
