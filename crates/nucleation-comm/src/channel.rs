//! In-process transport: one tokio channel per ordered pair of ranks.
//!
//! [`ChannelWorld::new`] wires `size` communicators together. Each ordered
//! pair `(src, dst)` gets its own unbounded mpsc channel, so messages from
//! one rank to another are strictly FIFO, and a shared
//! [`tokio::sync::Barrier`] implements [`Communicator::barrier`].
//!
//! All ranks of a world are meant to be driven concurrently, either as
//! separate tasks or joined on one task with `futures::future::join_all`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Barrier, Mutex};
use tracing::trace;

use crate::communicator::{Communicator, Rank};
use crate::error::CommError;
use crate::message::{Envelope, Payload, Tag};

/// A fully wired set of in-process communicators, one per rank.
#[derive(Debug)]
pub struct ChannelWorld {
    /// Communicators in rank order.
    members: Vec<ChannelCommunicator>,
}

impl ChannelWorld {
    /// Build a world of `size` ranks.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::EmptyWorld`] if `size` is zero.
    pub fn new(size: usize) -> Result<Self, CommError> {
        if size == 0 {
            return Err(CommError::EmptyWorld);
        }

        let barrier = Arc::new(Barrier::new(size));
        let mut outboxes: Vec<Vec<Option<UnboundedSender<Envelope>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();
        let mut inboxes: Vec<Vec<Option<Mutex<UnboundedReceiver<Envelope>>>>> =
            (0..size).map(|_| (0..size).map(|_| None).collect()).collect();

        for src in 0..size {
            for dst in (0..size).filter(|dst| *dst != src) {
                let (tx, rx) = mpsc::unbounded_channel();
                if let Some(slot) = outboxes.get_mut(src).and_then(|row| row.get_mut(dst)) {
                    *slot = Some(tx);
                }
                if let Some(slot) = inboxes.get_mut(dst).and_then(|row| row.get_mut(src)) {
                    *slot = Some(Mutex::new(rx));
                }
            }
        }

        let members = outboxes
            .into_iter()
            .zip(inboxes)
            .enumerate()
            .map(|(rank, (outboxes, inboxes))| ChannelCommunicator {
                rank,
                size,
                outboxes,
                inboxes,
                barrier: Arc::clone(&barrier),
                sent: AtomicU64::new(0),
            })
            .collect();

        Ok(Self { members })
    }

    /// Hand out the communicators, in rank order.
    pub fn into_communicators(self) -> Vec<ChannelCommunicator> {
        self.members
    }
}

/// One rank's endpoint in a [`ChannelWorld`].
#[derive(Debug)]
pub struct ChannelCommunicator {
    /// This rank.
    rank: Rank,
    /// World size.
    size: usize,
    /// Senders indexed by destination rank (`None` at our own rank).
    outboxes: Vec<Option<UnboundedSender<Envelope>>>,
    /// Receivers indexed by source rank (`None` at our own rank).
    inboxes: Vec<Option<Mutex<UnboundedReceiver<Envelope>>>>,
    /// Barrier shared by every rank of the world.
    barrier: Arc<Barrier>,
    /// Messages sent by this rank so far.
    sent: AtomicU64,
}

impl ChannelCommunicator {
    /// Number of messages this rank has sent.
    pub fn sent_messages(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    const fn invalid(&self, peer: Rank) -> CommError {
        CommError::InvalidRank {
            rank: self.rank,
            peer,
            size: self.size,
        }
    }

    fn outbox(&self, dest: Rank) -> Result<&UnboundedSender<Envelope>, CommError> {
        self.outboxes
            .get(dest)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.invalid(dest))
    }

    fn inbox(&self, source: Rank) -> Result<&Mutex<UnboundedReceiver<Envelope>>, CommError> {
        self.inboxes
            .get(source)
            .and_then(Option::as_ref)
            .ok_or_else(|| self.invalid(source))
    }
}

impl Communicator for ChannelCommunicator {
    fn rank(&self) -> Rank {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    async fn send(&self, dest: Rank, tag: Tag, payload: Payload) -> Result<(), CommError> {
        let outbox = self.outbox(dest)?;
        let len = payload.len();
        outbox
            .send(Envelope { tag, payload })
            .map_err(|_closed| CommError::PeerDisconnected { peer: dest })?;
        self.sent.fetch_add(1, Ordering::Relaxed);
        trace!(rank = self.rank, dest, %tag, len, "message sent");
        Ok(())
    }

    async fn recv(&self, source: Rank, tag: Tag) -> Result<Payload, CommError> {
        let inbox = self.inbox(source)?;
        let envelope = inbox
            .lock()
            .await
            .recv()
            .await
            .ok_or(CommError::PeerDisconnected { peer: source })?;

        if envelope.tag != tag {
            return Err(CommError::TagMismatch {
                sender: source,
                expected: tag,
                found: envelope.tag,
            });
        }

        trace!(rank = self.rank, source, %tag, len = envelope.payload.len(), "message received");
        Ok(envelope.payload)
    }

    async fn barrier(&self) -> Result<(), CommError> {
        self.barrier.wait().await;
        Ok(())
    }
}
