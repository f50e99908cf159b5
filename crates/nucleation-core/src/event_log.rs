//! The accepted event log: an append-only, replicated record of every
//! nucleation event in the run.
//!
//! Every worker owns one [`EventLog`]. After each pipeline run the
//! disseminator has handed every worker the same batch, and
//! [`EventLog::append_batch`] extends each replica identically.
//!
//! # Invariants
//!
//! - **Append-only**: entries are never modified or removed.
//! - **Canonical ids**: the event at index `i` has id `i`.
//! - **Separation**: no two events are closer than the run's minimum
//!   separation. The log does not enforce this on append (the sampler and
//!   resolver do); [`EventLog::verify_separation`] checks it after the fact.

use nucleation_types::{EventId, NucleationEvent, Point};
use serde::{Deserialize, Serialize};

/// Errors raised when extending or auditing the log.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LogError {
    /// A batch entry does not continue the log's id sequence.
    #[error("non-contiguous event id: expected {expected}, found {found}")]
    NonContiguousId {
        /// The id the log expected next.
        expected: EventId,
        /// The id the batch carried.
        found: EventId,
    },

    /// The `u32` id space is used up.
    #[error("event id space exhausted")]
    IdSpaceExhausted,

    /// Two logged events are closer than the minimum separation.
    #[error("events {first} and {second} are {distance} apart, below {min_separation}")]
    SeparationViolated {
        /// Earlier event.
        first: EventId,
        /// Later event.
        second: EventId,
        /// Distance between their centers.
        distance: f64,
        /// Required minimum.
        min_separation: f64,
    },
}

/// Append-only log of accepted nucleation events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventLog<const D: usize> {
    /// Events in id order.
    events: Vec<NucleationEvent<D>>,
}

impl<const D: usize> EventLog<D> {
    /// Create an empty log.
    pub const fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Build a log from events that must already carry ids `0..n`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NonContiguousId`] on the first out-of-sequence id.
    pub fn from_events(events: Vec<NucleationEvent<D>>) -> Result<Self, LogError> {
        let mut log = Self::new();
        log.append_batch(events)?;
        Ok(log)
    }

    /// Number of events.
    pub const fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the log is empty.
    pub const fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// All events in id order.
    pub fn events(&self) -> &[NucleationEvent<D>] {
        &self.events
    }

    /// Iterate over events in id order.
    pub fn iter(&self) -> impl Iterator<Item = &NucleationEvent<D>> {
        self.events.iter()
    }

    /// Look up an event by id.
    pub fn get(&self, id: EventId) -> Option<&NucleationEvent<D>> {
        usize::try_from(id.into_inner())
            .ok()
            .and_then(|index| self.events.get(index))
    }

    /// The id the next accepted event will receive.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::IdSpaceExhausted`] once the log holds `u32::MAX`
    /// events or more.
    pub fn next_id(&self) -> Result<EventId, LogError> {
        u32::try_from(self.events.len())
            .map(EventId)
            .map_err(|_err| LogError::IdSpaceExhausted)
    }

    /// Append a resolved batch.
    ///
    /// The batch must continue the id sequence exactly. It is validated in
    /// full before anything is appended, so a rejected batch leaves the log
    /// untouched. Returns the number of events appended.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NonContiguousId`] or [`LogError::IdSpaceExhausted`].
    pub fn append_batch(&mut self, batch: Vec<NucleationEvent<D>>) -> Result<usize, LogError> {
        let mut expected = self.next_id()?;
        let mut remaining = batch.len();
        for event in &batch {
            if event.id != expected {
                return Err(LogError::NonContiguousId {
                    expected,
                    found: event.id,
                });
            }
            remaining = remaining.saturating_sub(1);
            if remaining > 0 {
                expected = expected.next().ok_or(LogError::IdSpaceExhausted)?;
            }
        }

        let appended = batch.len();
        self.events.extend(batch);
        Ok(appended)
    }

    /// Whether `point` is at least `min_separation` from every logged event.
    pub fn is_clear_of(&self, point: &Point<D>, min_separation: f64) -> bool {
        self.events
            .iter()
            .all(|event| event.center().distance(point) >= min_separation)
    }

    /// Events whose hold period has elapsed at simulation time `time`.
    pub fn released(&self, time: f64) -> impl Iterator<Item = &NucleationEvent<D>> {
        self.events
            .iter()
            .filter(move |event| event.nucleus.is_released(time))
    }

    /// Check that ids run exactly `0..len`.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::NonContiguousId`] for the first misplaced id.
    pub fn verify_ids(&self) -> Result<(), LogError> {
        for (index, event) in self.events.iter().enumerate() {
            let expected = u32::try_from(index)
                .map(EventId)
                .map_err(|_err| LogError::IdSpaceExhausted)?;
            if event.id != expected {
                return Err(LogError::NonContiguousId {
                    expected,
                    found: event.id,
                });
            }
        }
        Ok(())
    }

    /// Check the pairwise separation invariant.
    ///
    /// # Errors
    ///
    /// Returns [`LogError::SeparationViolated`] for the first offending pair.
    pub fn verify_separation(&self, min_separation: f64) -> Result<(), LogError> {
        for (index, first) in self.events.iter().enumerate() {
            for second in self.events.iter().skip(index.saturating_add(1)) {
                let distance = first.center().distance(second.center());
                if distance < min_separation {
                    return Err(LogError::SeparationViolated {
                        first: first.id,
                        second: second.id,
                        distance,
                        min_separation,
                    });
                }
            }
        }
        Ok(())
    }
}
