//! Type-safe identifier wrappers around `u32`.
//!
//! Two kinds of identifier exist and must never be mixed:
//!
//! - [`EventId`] is canonical. It is assigned exactly once, by the conflict
//!   resolver, and equals the event's position in the replicated log.
//! - [`ProvisionalId`] is a batch-local sequence number given to a
//!   candidate by the worker that sampled it. It has no global meaning.
//!
//! Both travel as 32-bit unsigned integers on the wire.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around `u32` with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            /// Return the inner `u32` value.
            pub const fn into_inner(self) -> u32 {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(id: u32) -> Self {
                Self(id)
            }
        }

        impl From<$name> for u32 {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Canonical identifier of an accepted nucleation event.
    ///
    /// Identifiers are contiguous from zero across the whole run.
    EventId
}

define_id! {
    /// Batch-local sequence number of a candidate before resolution.
    ProvisionalId
}

impl EventId {
    /// Return the identifier that follows this one, or `None` on overflow.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(n) => Some(Self(n)),
            None => None,
        }
    }
}
