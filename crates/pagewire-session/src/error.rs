//! Error types for the session layer.

use pagewire_protocol::PageId;

/// Errors that can occur during registry operations.
///
/// Operations on unknown pages other than joins (relaying, updating
/// shared state, leaving) are silent no-ops rather than errors: a page
/// can expire between a client reading the page list and acting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// A join targeted a page that was never created or has expired.
    #[error("invalid session: page {0} does not exist")]
    InvalidSession(PageId),
}
