//! Point-to-point and collective messaging between nucleation workers.
//!
//! Workers share no memory. Every exchange is an explicit, blocking
//! message: a `send` pairs with a `recv` on the destination, and a
//! `barrier` returns only once every rank has reached it. There are no
//! timeouts and no retries; a failed exchange surfaces as a [`CommError`]
//! that the caller is expected to treat as fatal for the whole run.
//!
//! # Modules
//!
//! - [`message`] -- [`Tag`] and [`Payload`], the unit of transfer.
//! - [`communicator`] -- The [`Communicator`] trait every transport implements.
//! - [`channel`] -- [`ChannelWorld`], an in-process transport built on
//!   tokio channels and a shared barrier.
//! - [`collective`] -- Collectives (broadcast) built from the primitives.
//! - [`error`] -- [`CommError`].

pub mod channel;
pub mod collective;
pub mod communicator;
pub mod error;
pub mod message;

pub use channel::{ChannelCommunicator, ChannelWorld};
pub use collective::broadcast;
pub use communicator::{Communicator, Rank};
pub use error::CommError;
pub use message::{Payload, PayloadKind, Tag};
