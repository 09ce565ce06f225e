//! Error types for the relay layer.

/// Errors returned by [`HubHandle`](crate::HubHandle).
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The hub task has stopped, or its command channel is closed.
    #[error("relay hub is unavailable")]
    HubUnavailable,
}
