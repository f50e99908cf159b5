//! Dissemination of the resolved batch from the resolver rank to all ranks.

use nucleation_comm::{Communicator, Rank};
use nucleation_types::NucleationEvent;
use tracing::debug;

use crate::wire::{WireError, broadcast_batch};

/// Hand every rank the batch resolved on `root`.
///
/// The root passes `Some(accepted)`; every other rank passes `None` and
/// gets the root's batch back, replacing whatever it held. With a single
/// rank the batch is returned as is without touching the transport.
///
/// # Errors
///
/// Returns [`WireError`] on a transport failure or malformed batch.
pub async fn disseminate<C, const D: usize>(
    comm: &C,
    root: Rank,
    accepted: Option<Vec<NucleationEvent<D>>>,
) -> Result<Vec<NucleationEvent<D>>, WireError>
where
    C: Communicator,
{
    if !comm.is_distributed() {
        return Ok(accepted.unwrap_or_default());
    }

    let batch = broadcast_batch::<C, NucleationEvent<D>, D>(comm, root, accepted.as_deref()).await?;
    debug!(rank = comm.rank(), root, events = batch.len(), "Resolved batch received");
    Ok(batch)
}
