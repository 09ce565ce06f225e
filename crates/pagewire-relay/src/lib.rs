//! Page relay for Pagewire.
//!
//! Three layers, from the inside out:
//!
//! - [`Relay`]: maps connection ids to their outbound channels and
//!   resolves a [`Recipient`](pagewire_protocol::Recipient) against the
//!   current page membership
//! - [`Lifecycle`]: turns one connection event into registry mutations
//!   plus the `(Recipient, ServerEvent)` pairs to deliver
//! - [`Hub`] / [`HubHandle`]: the actor task that owns both, and the
//!   cheap-to-clone handle connection tasks talk to
//!
//! Only the hub task ever touches the registry, so each event is applied
//! in full before the next one is looked at.

mod error;
mod hub;
mod lifecycle;
mod relay;

pub use error::RelayError;
pub use hub::{Hub, HubHandle, spawn_hub};
pub use lifecycle::{ConnectionState, Lifecycle, LifecycleEvent};
pub use relay::{EventSender, Relay};
