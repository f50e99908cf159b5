//! Shared type definitions for the distributed nucleation protocol.
//!
//! This crate is the single source of truth for the records that flow
//! between the sampler, the relay chain, the resolver, and the replicated
//! event log.
//!
//! # Modules
//!
//! - [`ids`] -- Canonical and provisional identifier newtypes
//! - [`point`] -- Const-generic spatial coordinates with Euclidean distance
//! - [`nucleus`] -- Candidate and accepted nucleation event records

pub mod ids;
pub mod nucleus;
pub mod point;

// Re-export all public types at crate root for convenience.
pub use ids::{EventId, ProvisionalId};
pub use nucleus::{Candidate, NucleationEvent, Nucleus};
pub use point::Point;
