//! The [`Communicator`] trait.
//!
//! A communicator is one rank's handle on a fixed world of cooperating
//! workers. It offers exactly the primitives the nucleation protocol needs:
//! ordered point-to-point messages and a world-wide barrier. Collectives
//! such as [`broadcast`](crate::broadcast) are built on top.

use std::future::Future;

use crate::error::CommError;
use crate::message::{Payload, Tag};

/// Index of a worker in the world, `0..size`.
pub type Rank = usize;

/// One rank's handle on a fixed set of message-passing workers.
///
/// Messages between a given pair of ranks are delivered in the order they
/// were sent. A `recv` must name the tag it expects; receiving anything
/// else is a protocol desynchronization.
pub trait Communicator: Sync {
    /// This worker's rank.
    fn rank(&self) -> Rank;

    /// Number of ranks in the world.
    fn size(&self) -> usize;

    /// Send `payload` to `dest` under `tag`.
    fn send(
        &self,
        dest: Rank,
        tag: Tag,
        payload: Payload,
    ) -> impl Future<Output = Result<(), CommError>> + Send;

    /// Receive the next message from `source`, which must carry `tag`.
    fn recv(&self, source: Rank, tag: Tag) -> impl Future<Output = Result<Payload, CommError>> + Send;

    /// Block until every rank in the world has reached the barrier.
    fn barrier(&self) -> impl Future<Output = Result<(), CommError>> + Send;

    /// The last rank in the world.
    fn last_rank(&self) -> Rank {
        self.size().saturating_sub(1)
    }

    /// Whether more than one rank participates.
    fn is_distributed(&self) -> bool {
        self.size() > 1
    }
}
