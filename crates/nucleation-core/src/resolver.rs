//! Conflict resolution over the merged candidate batch.
//!
//! Candidates from different workers were sampled independently, so two of
//! them can land closer than the minimum separation. The resolver walks the
//! merged batch once, in merge order, and keeps a candidate only if it is
//! clear of every candidate kept before it (first-seen wins). Kept
//! candidates are promoted to events with contiguous ids starting at the
//! log's next id.
//!
//! The outcome depends on merge order: with candidates at `(0, 0)` and
//! `(0.05, 0)` and a separation of `0.1`, whichever comes first is kept.

use nucleation_types::{Candidate, EventId, NucleationEvent, Point, ProvisionalId};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::event_log::LogError;

/// A candidate dropped because an earlier one was kept too close to it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord<const D: usize> {
    /// Provisional id of the dropped candidate.
    pub rejected: ProvisionalId,
    /// Where the dropped candidate was.
    pub center: Point<D>,
    /// The nearest kept event.
    pub winner: EventId,
    /// Distance to that event.
    pub distance: f64,
}

/// Result of resolving one merged batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Resolution<const D: usize> {
    /// Promoted events, in acceptance order.
    pub accepted: Vec<NucleationEvent<D>>,
    /// Dropped candidates.
    pub conflicts: Vec<ConflictRecord<D>>,
}

/// Resolve `merged` greedily, assigning ids from `first_id` upward.
///
/// # Errors
///
/// Returns [`LogError::IdSpaceExhausted`] if the ids would overflow `u32`.
pub fn resolve_conflicts<const D: usize>(
    merged: Vec<Candidate<D>>,
    first_id: EventId,
    min_separation: f64,
) -> Result<Resolution<D>, LogError> {
    let mut resolution = Resolution {
        accepted: Vec::with_capacity(merged.len()),
        conflicts: Vec::new(),
    };
    let mut next_id = Some(first_id);

    for candidate in merged {
        let nearest = resolution
            .accepted
            .iter()
            .map(|event| (event.id, event.center().distance(candidate.center())))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((winner, distance)) if distance < min_separation => {
                info!(
                    rejected = %candidate.provisional_id,
                    winner = %winner,
                    center = %candidate.center(),
                    distance,
                    "Conflict between candidates"
                );
                resolution.conflicts.push(ConflictRecord {
                    rejected: candidate.provisional_id,
                    center: *candidate.center(),
                    winner,
                    distance,
                });
            }
            _ => {
                let id = next_id.ok_or(LogError::IdSpaceExhausted)?;
                next_id = id.next();
                let event = candidate.promote(id);
                info!(
                    id = %event.id,
                    center = %event.center(),
                    step = event.nucleus.created_step,
                    "Nucleation event accepted"
                );
                resolution.accepted.push(event);
            }
        }
    }

    Ok(resolution)
}
