//! Nucleation records: the shared [`Nucleus`] payload, the worker-local
//! [`Candidate`], and the canonical [`NucleationEvent`].
//!
//! A candidate and an event carry exactly the same physical payload. They
//! differ only in the identifier they hold: a candidate's id is provisional
//! and batch-local, an event's id is canonical and equals its index in the
//! replicated log. Promotion from one to the other happens only in the
//! conflict resolver via [`Candidate::promote`].

use serde::{Deserialize, Serialize};

use crate::ids::{EventId, ProvisionalId};
use crate::point::Point;

/// The physical payload shared by candidates and accepted events.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Nucleus<const D: usize> {
    /// Center of the nucleus in the domain.
    pub center: Point<D>,
    /// Seeding radius. Fixed at creation.
    pub radius: f64,
    /// Simulation time at which the nucleus was proposed.
    pub created_at: f64,
    /// How long the nucleus stays in the held state before seeding.
    pub hold_duration: f64,
    /// Timestep index at which the nucleus was proposed.
    pub created_step: u32,
}

impl<const D: usize> Nucleus<D> {
    /// Simulation time at which the hold period ends.
    pub fn hold_until(&self) -> f64 {
        self.created_at + self.hold_duration
    }

    /// Whether the hold period has elapsed at simulation time `time`.
    pub fn is_released(&self, time: f64) -> bool {
        time >= self.hold_until()
    }
}

/// A tentative nucleation event owned by the worker that sampled it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candidate<const D: usize> {
    /// Batch-local sequence number with no global meaning.
    pub provisional_id: ProvisionalId,
    /// Physical payload.
    #[serde(flatten)]
    pub nucleus: Nucleus<D>,
}

impl<const D: usize> Candidate<D> {
    /// Create a candidate with the given provisional id.
    pub const fn new(provisional_id: ProvisionalId, nucleus: Nucleus<D>) -> Self {
        Self {
            provisional_id,
            nucleus,
        }
    }

    /// Center of the candidate.
    pub const fn center(&self) -> &Point<D> {
        &self.nucleus.center
    }

    /// Promote the candidate to a canonical event with identifier `id`.
    pub const fn promote(self, id: EventId) -> NucleationEvent<D> {
        NucleationEvent {
            id,
            nucleus: self.nucleus,
        }
    }
}

/// An accepted, canonically identified, immutable nucleation event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NucleationEvent<const D: usize> {
    /// Canonical identifier, equal to the event's index in the log.
    pub id: EventId,
    /// Physical payload.
    #[serde(flatten)]
    pub nucleus: Nucleus<D>,
}

impl<const D: usize> NucleationEvent<D> {
    /// Center of the event.
    pub const fn center(&self) -> &Point<D> {
        &self.nucleus.center
    }
}
