//! Page session registry for Pagewire.
//!
//! This crate owns the only mutable shared state in the relay:
//!
//! 1. **Pages**: which page ids exist, in creation order ([`SessionRegistry`])
//! 2. **Membership**: which connections are in which page, with a
//!    reverse index so a connection is in at most one page
//! 3. **Shared state**: the last message relayed on each page
//! 4. **Expiry**: the pending timer handle stored on each page record
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay / Hub (above)  ← mutates the registry, one event at a time
//!     ↕
//! Session Layer (this crate)  ← pages, members, shared state, timers
//!     ↕
//! Protocol + Expiry (below)  ← PageId, ConnectionId, ExpiryScheduler
//! ```

mod error;
mod page;
mod registry;

pub use error::SessionError;
pub use page::PageSession;
pub use registry::{JoinOutcome, SessionRegistry};
