//! Wire protocol for Pagewire.
//!
//! This crate defines what clients and the relay say to each other:
//!
//! - **Events** ([`ClientEvent`], [`ServerEvent`]): every frame is one
//!   named event with a payload, `{"event": "...", "data": ...}`.
//! - **Addressing** ([`Recipient`]): who a server event is meant for.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how events become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! The protocol layer knows nothing about pages that exist or who is in
//! them. It only knows the shape of the messages.
//!
//! ```text
//! Transport (frames) → Protocol (events) → Relay (pages, members)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use pagewire_transport::ConnectionId;
pub use types::{
    ClientEvent, PageId, Recipient, ServerEvent, INVALID_SESSION_TEXT,
    SESSION_EXPIRED_TEXT,
};
