//! Error types for the `nucleation-comm` crate.
//!
//! Every variant describes a protocol failure that the run cannot recover
//! from. Callers propagate these with `?` up to the process boundary.

use crate::communicator::Rank;
use crate::message::{PayloadKind, Tag};

/// Errors raised by a [`Communicator`](crate::Communicator).
#[derive(Debug, thiserror::Error)]
pub enum CommError {
    /// A world must contain at least one rank.
    #[error("cannot build a communicator world with zero ranks")]
    EmptyWorld,

    /// A rank outside `0..size`, or the caller's own rank, was addressed.
    #[error("rank {rank} cannot address rank {peer} in a world of {size}")]
    InvalidRank {
        /// The calling rank.
        rank: Rank,
        /// The addressed peer.
        peer: Rank,
        /// Number of ranks in the world.
        size: usize,
    },

    /// The peer's end of the channel is gone.
    #[error("peer {peer} disconnected")]
    PeerDisconnected {
        /// The unreachable peer.
        peer: Rank,
    },

    /// The next message from `sender` carried a different tag than expected.
    #[error("protocol desync from rank {sender}: expected tag {expected}, got {found}")]
    TagMismatch {
        /// The sending rank.
        sender: Rank,
        /// The tag the receiver was waiting for.
        expected: Tag,
        /// The tag that actually arrived.
        found: Tag,
    },

    /// The payload arrived with the wrong element type.
    #[error("payload kind mismatch on tag {tag}: expected {expected:?}, got {found:?}")]
    PayloadKindMismatch {
        /// Tag of the offending message.
        tag: Tag,
        /// The expected payload kind.
        expected: PayloadKind,
        /// The kind that arrived.
        found: PayloadKind,
    },

    /// A broadcast root was asked to send but had nothing to send.
    #[error("broadcast root {root} has no payload for tag {tag}")]
    MissingRootPayload {
        /// The root rank.
        root: Rank,
        /// The broadcast tag.
        tag: Tag,
    },
}
