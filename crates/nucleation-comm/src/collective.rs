//! Collectives built from [`Communicator`] primitives.

use tracing::trace;

use crate::communicator::{Communicator, Rank};
use crate::error::CommError;
use crate::message::{Payload, Tag};

/// Broadcast a payload from `root` to every other rank.
///
/// The root passes `Some(payload)` and gets it back unchanged; every other
/// rank passes `None` and receives the root's payload. Every rank must call
/// this with the same `root` and `tag`.
///
/// # Errors
///
/// Returns [`CommError::MissingRootPayload`] if the root passes `None`, or
/// any error raised by the underlying send/receive.
pub async fn broadcast<C: Communicator>(
    comm: &C,
    root: Rank,
    tag: Tag,
    payload: Option<Payload>,
) -> Result<Payload, CommError> {
    if comm.rank() != root {
        return comm.recv(root, tag).await;
    }

    let payload = payload.ok_or(CommError::MissingRootPayload { root, tag })?;
    for dest in (0..comm.size()).filter(|dest| *dest != root) {
        comm.send(dest, tag, payload.clone()).await?;
    }
    trace!(root, %tag, peers = comm.size().saturating_sub(1), "broadcast sent");
    Ok(payload)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::channel::ChannelWorld;

    #[tokio::test]
    async fn every_rank_receives_root_payload() {
        let comms = ChannelWorld::new(4).unwrap().into_communicators();
        let root = 3;
        let results = futures::future::join_all(comms.iter().map(|comm| {
            let mine = (comm.rank() == root).then(|| Payload::Double(vec![0.5, 1.5]));
            broadcast(comm, root, Tag(9), mine)
        }))
        .await;

        for result in results {
            assert_eq!(result.unwrap(), Payload::Double(vec![0.5, 1.5]));
        }
    }

    #[tokio::test]
    async fn single_rank_broadcast_sends_nothing() {
        let comms = ChannelWorld::new(1).unwrap().into_communicators();
        let comm = comms.first().unwrap();
        let out = broadcast(comm, 0, Tag(0), Some(Payload::Count(3))).await.unwrap();
        assert_eq!(out, Payload::Count(3));
        assert_eq!(comm.sent_messages(), 0);
    }

    #[tokio::test]
    async fn root_without_payload_fails() {
        let comms = ChannelWorld::new(1).unwrap().into_communicators();
        let comm = comms.first().unwrap();
        let result = broadcast(comm, 0, Tag(2), None).await;
        assert!(matches!(result, Err(CommError::MissingRootPayload { root: 0, .. })));
    }
}
