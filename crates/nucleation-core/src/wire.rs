//! Wire encoding of candidate and event batches.
//!
//! A batch travels as a count followed by one parallel array per field.
//! Every array is its own tagged message:
//!
//! | Tag | Field | Kind |
//! |-----|-------|------|
//! | 0 | count | `u32` |
//! | 1 | id | `u32[count]` |
//! | 2 .. 2+D | center, one array per axis | `f64[count]` |
//! | 2+D | radius | `f64[count]` |
//! | 3+D | `created_at` | `f64[count]` |
//! | 4+D | `hold_duration` | `f64[count]` |
//! | 5+D | `created_step` | `u32[count]` |
//!
//! The arrays are omitted when the count is zero. Receivers size their
//! buffers from the count; an array of any other length is a protocol
//! violation.

use nucleation_comm::{CommError, Communicator, Payload, Rank, Tag, broadcast};
use nucleation_types::{
    Candidate, EventId, NucleationEvent, Nucleus, Point, ProvisionalId,
};

/// Tag of the leading count message.
pub const COUNT_TAG: Tag = Tag(0);

/// Errors raised while moving a batch over the wire.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// An array's length differs from the announced count.
    #[error("array {field} (tag {tag}) has {actual} elements, count announced {declared}")]
    LengthMismatch {
        /// The field the array carries.
        field: WireField,
        /// Its tag.
        tag: Tag,
        /// Count sent ahead of the arrays.
        declared: u32,
        /// Elements actually received.
        actual: usize,
    },

    /// The batch does not fit the `u32` count.
    #[error("batch of {len} records exceeds the wire count range")]
    BatchTooLarge {
        /// Number of records offered.
        len: usize,
    },

    /// The transport failed.
    #[error("transport error: {source}")]
    Comm {
        /// The underlying communicator error.
        #[from]
        source: CommError,
    },
}

/// One parallel array of the wire layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireField {
    /// Provisional or canonical id.
    Id,
    /// One coordinate axis of the center.
    Center(usize),
    /// Seeding radius.
    Radius,
    /// Creation time.
    CreatedAt,
    /// Hold period.
    HoldDuration,
    /// Creation step.
    CreatedStep,
}

impl WireField {
    /// All arrays in transmission order for a `D`-dimensional batch.
    pub fn layout<const D: usize>() -> impl Iterator<Item = Self> {
        core::iter::once(Self::Id)
            .chain((0..D).map(Self::Center))
            .chain([
                Self::Radius,
                Self::CreatedAt,
                Self::HoldDuration,
                Self::CreatedStep,
            ])
    }

    /// Message tag of this array in a `D`-dimensional batch.
    pub fn tag<const D: usize>(self) -> Tag {
        let dim = u32::try_from(D).unwrap_or(u32::MAX);
        let offset = match self {
            Self::Id => 1,
            Self::Center(axis) => u32::try_from(axis).unwrap_or(u32::MAX).saturating_add(2),
            Self::Radius => dim.saturating_add(2),
            Self::CreatedAt => dim.saturating_add(3),
            Self::HoldDuration => dim.saturating_add(4),
            Self::CreatedStep => dim.saturating_add(5),
        };
        Tag(offset)
    }
}

impl core::fmt::Display for WireField {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Id => write!(f, "id"),
            Self::Center(axis) => write!(f, "center[{axis}]"),
            Self::Radius => write!(f, "radius"),
            Self::CreatedAt => write!(f, "created_at"),
            Self::HoldDuration => write!(f, "hold_duration"),
            Self::CreatedStep => write!(f, "created_step"),
        }
    }
}

/// A record that can travel in a wire batch.
pub trait WireRecord<const D: usize>: Sized {
    /// The id carried in the id array.
    fn wire_id(&self) -> u32;

    /// The physical payload.
    fn nucleus(&self) -> &Nucleus<D>;

    /// Rebuild a record from its wire parts.
    fn from_wire(id: u32, nucleus: Nucleus<D>) -> Self;
}

impl<const D: usize> WireRecord<D> for Candidate<D> {
    fn wire_id(&self) -> u32 {
        self.provisional_id.into_inner()
    }

    fn nucleus(&self) -> &Nucleus<D> {
        &self.nucleus
    }

    fn from_wire(id: u32, nucleus: Nucleus<D>) -> Self {
        Self::new(ProvisionalId(id), nucleus)
    }
}

impl<const D: usize> WireRecord<D> for NucleationEvent<D> {
    fn wire_id(&self) -> u32 {
        self.id.into_inner()
    }

    fn nucleus(&self) -> &Nucleus<D> {
        &self.nucleus
    }

    fn from_wire(id: u32, nucleus: Nucleus<D>) -> Self {
        Self {
            id: EventId(id),
            nucleus,
        }
    }
}

/// A batch laid out as parallel arrays.
#[derive(Debug, Clone, PartialEq)]
pub struct WireBatch<const D: usize> {
    count: u32,
    ids: Vec<u32>,
    centers: [Vec<f64>; D],
    radius: Vec<f64>,
    created_at: Vec<f64>,
    hold_duration: Vec<f64>,
    created_step: Vec<u32>,
}

impl<const D: usize> WireBatch<D> {
    /// An empty batch with buffers sized for `count` records.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BatchTooLarge`] if `count` does not fit `usize`.
    pub fn with_count(count: u32) -> Result<Self, WireError> {
        let len = usize::try_from(count).map_err(|_err| WireError::BatchTooLarge {
            len: usize::MAX,
        })?;
        Ok(Self {
            count,
            ids: Vec::with_capacity(len),
            centers: core::array::from_fn(|_| Vec::with_capacity(len)),
            radius: Vec::with_capacity(len),
            created_at: Vec::with_capacity(len),
            hold_duration: Vec::with_capacity(len),
            created_step: Vec::with_capacity(len),
        })
    }

    /// Lay out `records` as parallel arrays.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::BatchTooLarge`] for more than `u32::MAX` records.
    pub fn encode<T: WireRecord<D>>(records: &[T]) -> Result<Self, WireError> {
        let count = u32::try_from(records.len()).map_err(|_err| WireError::BatchTooLarge {
            len: records.len(),
        })?;
        let mut batch = Self::with_count(count)?;
        for record in records {
            let nucleus = record.nucleus();
            batch.ids.push(record.wire_id());
            for (column, coord) in batch.centers.iter_mut().zip(nucleus.center.coords()) {
                column.push(*coord);
            }
            batch.radius.push(nucleus.radius);
            batch.created_at.push(nucleus.created_at);
            batch.hold_duration.push(nucleus.hold_duration);
            batch.created_step.push(nucleus.created_step);
        }
        Ok(batch)
    }

    /// The announced record count.
    pub const fn count(&self) -> u32 {
        self.count
    }

    /// Move one array out as a payload, leaving it empty.
    pub fn take(&mut self, field: WireField) -> Payload {
        match field {
            WireField::Id => Payload::Unsigned(core::mem::take(&mut self.ids)),
            WireField::CreatedStep => Payload::Unsigned(core::mem::take(&mut self.created_step)),
            WireField::Center(axis) => Payload::Double(
                self.centers
                    .get_mut(axis)
                    .map(core::mem::take)
                    .unwrap_or_default(),
            ),
            WireField::Radius => Payload::Double(core::mem::take(&mut self.radius)),
            WireField::CreatedAt => Payload::Double(core::mem::take(&mut self.created_at)),
            WireField::HoldDuration => Payload::Double(core::mem::take(&mut self.hold_duration)),
        }
    }

    /// Install a received array, checking its kind and length.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::Comm`] wrapping a kind mismatch, or
    /// [`WireError::LengthMismatch`] if the length differs from the count.
    pub fn fill(&mut self, field: WireField, payload: Payload) -> Result<(), WireError> {
        let tag = field.tag::<D>();
        let declared = self.count;
        let check = |actual: usize| {
            if usize::try_from(declared).is_ok_and(|d| d == actual) {
                Ok(())
            } else {
                Err(WireError::LengthMismatch {
                    field,
                    tag,
                    declared,
                    actual,
                })
            }
        };

        match field {
            WireField::Id | WireField::CreatedStep => {
                let values = payload.into_unsigned(tag)?;
                check(values.len())?;
                if field == WireField::Id {
                    self.ids = values;
                } else {
                    self.created_step = values;
                }
            }
            WireField::Center(axis) => {
                let values = payload.into_double(tag)?;
                check(values.len())?;
                if let Some(column) = self.centers.get_mut(axis) {
                    *column = values;
                }
            }
            WireField::Radius | WireField::CreatedAt | WireField::HoldDuration => {
                let values = payload.into_double(tag)?;
                check(values.len())?;
                match field {
                    WireField::Radius => self.radius = values,
                    WireField::CreatedAt => self.created_at = values,
                    _ => self.hold_duration = values,
                }
            }
        }
        Ok(())
    }

    /// Rebuild the records, in array order.
    ///
    /// # Errors
    ///
    /// Returns [`WireError::LengthMismatch`] if any array is shorter than
    /// the count (for example, one that was never filled).
    pub fn decode<T: WireRecord<D>>(self) -> Result<Vec<T>, WireError> {
        let len = usize::try_from(self.count).map_err(|_err| WireError::BatchTooLarge {
            len: usize::MAX,
        })?;
        let mut records = Vec::with_capacity(len);
        for index in 0..len {
            let mut coords = [0.0; D];
            for (axis, (slot, column)) in coords.iter_mut().zip(&self.centers).enumerate() {
                *slot = self.at(column, index, WireField::Center(axis))?;
            }
            let nucleus = Nucleus {
                center: Point::new(coords),
                radius: self.at(&self.radius, index, WireField::Radius)?,
                created_at: self.at(&self.created_at, index, WireField::CreatedAt)?,
                hold_duration: self.at(&self.hold_duration, index, WireField::HoldDuration)?,
                created_step: self.at(&self.created_step, index, WireField::CreatedStep)?,
            };
            let id = self.at(&self.ids, index, WireField::Id)?;
            records.push(T::from_wire(id, nucleus));
        }
        Ok(records)
    }

    fn at<V: Copy>(&self, column: &[V], index: usize, field: WireField) -> Result<V, WireError> {
        column
            .get(index)
            .copied()
            .ok_or_else(|| WireError::LengthMismatch {
                field,
                tag: field.tag::<D>(),
                declared: self.count,
                actual: column.len(),
            })
    }
}

/// Send a batch to `dest`: the count, then (if non-zero) every array.
///
/// # Errors
///
/// Returns [`WireError`] if the batch is too large or the transport fails.
pub async fn send_batch<C, T, const D: usize>(
    comm: &C,
    dest: Rank,
    records: &[T],
) -> Result<(), WireError>
where
    C: Communicator,
    T: WireRecord<D>,
{
    let mut batch = WireBatch::<D>::encode(records)?;
    comm.send(dest, COUNT_TAG, Payload::Count(batch.count())).await?;
    if batch.count() == 0 {
        return Ok(());
    }
    for field in WireField::layout::<D>() {
        let payload = batch.take(field);
        comm.send(dest, field.tag::<D>(), payload).await?;
    }
    Ok(())
}

/// Receive a batch sent by [`send_batch`] from `source`.
///
/// # Errors
///
/// Returns [`WireError::LengthMismatch`] if an array disagrees with the
/// count, or [`WireError::Comm`] on a transport failure or tag desync.
pub async fn recv_batch<C, T, const D: usize>(comm: &C, source: Rank) -> Result<Vec<T>, WireError>
where
    C: Communicator,
    T: WireRecord<D>,
{
    let count = comm.recv(source, COUNT_TAG).await?.into_count(COUNT_TAG)?;
    if count == 0 {
        return Ok(Vec::new());
    }
    let mut batch = WireBatch::<D>::with_count(count)?;
    for field in WireField::layout::<D>() {
        let payload = comm.recv(source, field.tag::<D>()).await?;
        batch.fill(field, payload)?;
    }
    batch.decode()
}

/// Broadcast a batch from `root` to every rank, field by field.
///
/// The root passes `Some(records)`; the others pass `None`. Every rank,
/// the root included, gets back the batch as decoded from the wire arrays.
///
/// # Errors
///
/// Returns [`WireError`] on a transport failure or a malformed batch.
pub async fn broadcast_batch<C, T, const D: usize>(
    comm: &C,
    root: Rank,
    records: Option<&[T]>,
) -> Result<Vec<T>, WireError>
where
    C: Communicator,
    T: WireRecord<D>,
{
    let mut outgoing = match records {
        Some(records) if comm.rank() == root => Some(WireBatch::<D>::encode(records)?),
        _ => None,
    };

    let announced = outgoing.as_ref().map(|batch| Payload::Count(batch.count()));
    let count = broadcast(comm, root, COUNT_TAG, announced)
        .await?
        .into_count(COUNT_TAG)?;
    if count == 0 {
        return Ok(Vec::new());
    }

    let mut incoming = WireBatch::<D>::with_count(count)?;
    for field in WireField::layout::<D>() {
        let mine = outgoing.as_mut().map(|batch| batch.take(field));
        let payload = broadcast(comm, root, field.tag::<D>(), mine).await?;
        incoming.fill(field, payload)?;
    }
    incoming.decode()
}
