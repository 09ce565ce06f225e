//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the bytes and the event types disagree.
//! It never means a page was missing or a peer went away; those belong to
//! the session and transport layers.

/// Errors that can occur while encoding or decoding events.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// An event could not be serialized.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A frame could not be parsed as an event.
    ///
    /// Typical causes: malformed JSON, an unknown `event` name, or a
    /// payload with missing fields.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
