//! Sequential batch relay: gather every rank's candidates on the last rank.
//!
//! The relay runs `size - 1` hops. At hop `k`, rank `k` sends everything it
//! holds to rank `k + 1`, which puts the received batch in front of its own.
//! Every rank then waits at a barrier before the next hop starts. After the
//! last hop the last rank holds all candidates in rank order, each rank's
//! candidates in the order its sampler produced them.

use nucleation_comm::Communicator;
use nucleation_types::Candidate;
use tracing::debug;

use crate::wire::{WireError, recv_batch, send_batch};

/// Relay candidate batches up the rank chain.
///
/// Returns what this rank holds when the relay completes: the full merged
/// batch on the last rank, and on every other rank the batch it forwarded.
/// With a single rank the local batch is returned untouched and nothing is
/// sent.
///
/// # Errors
///
/// Returns [`WireError`] on any transport failure or malformed batch.
pub async fn relay_candidates<C, const D: usize>(
    comm: &C,
    local: Vec<Candidate<D>>,
) -> Result<Vec<Candidate<D>>, WireError>
where
    C: Communicator,
{
    let rank = comm.rank();
    let mut held = local;

    for hop in 0..comm.last_rank() {
        let next = hop.saturating_add(1);
        if rank == hop {
            send_batch::<C, Candidate<D>, D>(comm, next, &held).await?;
            debug!(rank, hop, sent = held.len(), "Relayed candidate batch");
        } else if rank == next {
            let mut merged = recv_batch::<C, Candidate<D>, D>(comm, hop).await?;
            debug!(rank, hop, received = merged.len(), own = held.len(), "Merged candidate batch");
            merged.append(&mut held);
            held = merged;
        }
        comm.barrier().await?;
    }

    Ok(held)
}
