//! Transport abstraction layer for Pagewire.
//!
//! Provides the [`Transport`] and [`Connection`] traits that the relay
//! server is written against, plus the WebSocket implementation.
//!
//! Every accepted connection gets an opaque [`ConnectionId`]. Clients learn
//! their id from the server and echo it back when they want to be excluded
//! from a page broadcast, so the id is a string on the wire.
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod status;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{PendingConnection, WebSocketConnection, WebSocketTransport};

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of random bytes in a generated connection id (20 hex chars).
const CONNECTION_ID_BYTES: usize = 10;

/// Opaque identifier for a connection.
///
/// Serialized as a bare string, so `ConnectionId::new("abc")` travels as
/// `"abc"`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Wraps an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random id: 80 bits rendered as lowercase hex.
    pub fn generate() -> Self {
        let bytes: [u8; CONNECTION_ID_BYTES] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Borrows the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the underlying string.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Accepts new incoming connections.
pub trait Transport: Send + Sync + 'static {
    /// A peer that has connected but not yet finished its handshake.
    type Pending: Handshake;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next peer.
    ///
    /// Does no protocol work, so a slow or silent peer never holds up the
    /// ones behind it. Drive the returned [`Handshake`] on its own task.
    async fn accept(&mut self) -> Result<Self::Pending, Self::Error>;
}

/// The protocol-level half of accepting a peer.
pub trait Handshake: Send + 'static {
    /// The connection produced once the handshake succeeds.
    type Connection: Connection;
    /// The error type for handshake failures.
    type Error: std::error::Error + Send + Sync;

    /// Completes the handshake.
    ///
    /// Returns `Ok(None)` when the peer was answered directly and never
    /// becomes a connection.
    async fn complete(self) -> Result<Option<Self::Connection>, Self::Error>;
}

/// A single connection that can send and receive frames.
pub trait Connection: Send + Sync + 'static {
    /// The error type for connection operations.
    type Error: std::error::Error + Send + Sync;

    /// Sends one frame to the remote peer.
    async fn send(&self, data: &[u8]) -> Result<(), Self::Error>;

    /// Receives the next frame from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    /// Closes the connection.
    async fn close(&self) -> Result<(), Self::Error>;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> &ConnectionId;
}
