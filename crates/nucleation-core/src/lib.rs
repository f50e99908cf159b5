//! The distributed nucleation protocol: sampling, relay, conflict
//! resolution, dissemination, and refinement.
//!
//! Each worker samples candidate nuclei on the cells it owns. The batches
//! are relayed to the last rank, deduplicated there in merge order, and the
//! surviving events are broadcast back so that every worker appends the
//! same batch to its replica of the [`EventLog`]. Cells near the new events
//! are then refined.
//!
//! # Modules
//!
//! - [`config`] -- Configuration loading from `nucleation-config.yaml` and
//!   validation into [`NucleationParams`].
//! - [`probability`] -- The nucleation rate and per-sample probability.
//! - [`field`] -- [`FieldSource`], the driving field the sampler reads.
//! - [`mesh`] -- [`MeshEngine`], the adaptive mesh the pipeline refines.
//! - [`sampler`] -- Candidate sampling over local quadrature points.
//! - [`wire`] -- Parallel-array batch encoding and batch transfer.
//! - [`relay`] -- Sequential hop relay of candidates to the last rank.
//! - [`resolver`] -- Greedy first-seen-wins conflict resolution.
//! - [`disseminate`] -- Broadcast of the resolved batch.
//! - [`event_log`] -- The append-only replicated [`EventLog`].
//! - [`refinement`] -- Refinement around newly accepted events.
//! - [`schedule`] -- [`StepClock`], step index to simulation time.
//! - [`step`] -- The full per-step pipeline.
//!
//! [`EventLog`]: event_log::EventLog
//! [`NucleationParams`]: config::NucleationParams
//! [`FieldSource`]: field::FieldSource
//! [`MeshEngine`]: mesh::MeshEngine
//! [`StepClock`]: schedule::StepClock

pub mod config;
pub mod disseminate;
pub mod event_log;
pub mod field;
pub mod mesh;
pub mod probability;
pub mod refinement;
pub mod relay;
pub mod resolver;
pub mod sampler;
pub mod schedule;
pub mod step;
pub mod wire;
