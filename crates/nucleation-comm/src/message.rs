//! The unit of transfer: a [`Tag`] plus a typed [`Payload`].
//!
//! Payloads are typed buffers rather than raw bytes. A single count
//! travels as [`Payload::Count`]; parallel arrays travel as
//! [`Payload::Unsigned`] (32-bit unsigned) or [`Payload::Double`]
//! (64-bit float).

use serde::{Deserialize, Serialize};

use crate::error::CommError;

/// Message tag used to match a send with its receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tag(pub u32);

impl core::fmt::Display for Tag {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Element type of a [`Payload`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadKind {
    /// A single item count.
    Count,
    /// An array of `u32`.
    Unsigned,
    /// An array of `f64`.
    Double,
}

/// A typed message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    /// A single item count.
    Count(u32),
    /// An array of 32-bit unsigned integers.
    Unsigned(Vec<u32>),
    /// An array of 64-bit floats.
    Double(Vec<f64>),
}

impl Payload {
    /// The element type of this payload.
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Count(_) => PayloadKind::Count,
            Self::Unsigned(_) => PayloadKind::Unsigned,
            Self::Double(_) => PayloadKind::Double,
        }
    }

    /// Number of elements carried (1 for a count).
    pub const fn len(&self) -> usize {
        match self {
            Self::Count(_) => 1,
            Self::Unsigned(v) => v.len(),
            Self::Double(v) => v.len(),
        }
    }

    /// Whether the payload carries no elements.
    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Extract a count.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::PayloadKindMismatch`] for any other kind.
    pub fn into_count(self, tag: Tag) -> Result<u32, CommError> {
        match self {
            Self::Count(n) => Ok(n),
            other => Err(mismatch(tag, PayloadKind::Count, &other)),
        }
    }

    /// Extract an unsigned array.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::PayloadKindMismatch`] for any other kind.
    pub fn into_unsigned(self, tag: Tag) -> Result<Vec<u32>, CommError> {
        match self {
            Self::Unsigned(v) => Ok(v),
            other => Err(mismatch(tag, PayloadKind::Unsigned, &other)),
        }
    }

    /// Extract a float array.
    ///
    /// # Errors
    ///
    /// Returns [`CommError::PayloadKindMismatch`] for any other kind.
    pub fn into_double(self, tag: Tag) -> Result<Vec<f64>, CommError> {
        match self {
            Self::Double(v) => Ok(v),
            other => Err(mismatch(tag, PayloadKind::Double, &other)),
        }
    }
}

const fn mismatch(tag: Tag, expected: PayloadKind, found: &Payload) -> CommError {
    CommError::PayloadKindMismatch {
        tag,
        expected,
        found: found.kind(),
    }
}

/// A payload in flight, stamped with its tag.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Envelope {
    /// Tag the sender attached.
    pub(crate) tag: Tag,
    /// Message body.
    pub(crate) payload: Payload,
}
