//! The page session record.

use std::collections::HashSet;

use pagewire_expiry::ExpiryTimer;
use pagewire_protocol::ConnectionId;

/// One collaboration page.
///
/// Lives from `create_page` until its expiry timer fires. An empty
/// `members` set does not remove the page.
#[derive(Debug)]
pub struct PageSession {
    pub(crate) members: HashSet<ConnectionId>,
    pub(crate) shared_state: String,
    pub(crate) timer: ExpiryTimer,
}

impl PageSession {
    pub(crate) fn new(timer: ExpiryTimer) -> Self {
        Self {
            members: HashSet::new(),
            shared_state: String::new(),
            timer,
        }
    }

    /// Connections currently in the page.
    pub fn members(&self) -> &HashSet<ConnectionId> {
        &self.members
    }

    /// The last message relayed on the page (empty until the first one).
    pub fn shared_state(&self) -> &str {
        &self.shared_state
    }

    /// Generation of the live timer; older notices are stale.
    pub fn generation(&self) -> u64 {
        self.timer.generation()
    }
}
