//! Outbound delivery: connection id → event channel.

use std::collections::HashMap;

use pagewire_protocol::{ConnectionId, PageId, Recipient, ServerEvent};
use pagewire_session::SessionRegistry;
use tokio::sync::mpsc;

/// Channel a connection task drains to write events to its socket.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Delivers [`ServerEvent`]s to connections.
///
/// Every operation is fire-and-forget. Sends to unknown connections or
/// to a closed channel (a socket that is going away) are dropped. The
/// unbounded channels mean delivery never waits on network I/O; ordering
/// per connection follows send order.
#[derive(Debug, Default)]
pub struct Relay {
    senders: HashMap<ConnectionId, EventSender>,
}

impl Relay {
    /// Creates an empty relay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts routing events for `conn` into `sender`.
    pub fn register(&mut self, conn: ConnectionId, sender: EventSender) {
        self.senders.insert(conn, sender);
    }

    /// Stops routing events for `conn`.
    pub fn unregister(&mut self, conn: &ConnectionId) -> bool {
        self.senders.remove(conn).is_some()
    }

    /// Returns `true` if `conn` is registered.
    pub fn is_registered(&self, conn: &ConnectionId) -> bool {
        self.senders.contains_key(conn)
    }

    /// Number of registered connections.
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Sends to one connection, page member or not.
    pub fn notify_connection(&self, conn: &ConnectionId, event: ServerEvent) {
        self.send_to(conn, event);
    }

    /// Sends to every member of `page_id`. Unknown page: nothing is sent.
    pub fn notify_page(
        &self,
        registry: &SessionRegistry,
        page_id: &PageId,
        event: &ServerEvent,
    ) {
        let Some(members) = registry.members(page_id) else {
            tracing::debug!(%page_id, event = event.name(), "notify on unknown page");
            return;
        };
        for conn in members {
            self.send_to(conn, event.clone());
        }
    }

    /// Like [`notify_page`](Self::notify_page) but skips `exclude`.
    pub fn notify_all_except(
        &self,
        registry: &SessionRegistry,
        page_id: &PageId,
        exclude: &ConnectionId,
        event: &ServerEvent,
    ) {
        let Some(members) = registry.members(page_id) else {
            tracing::debug!(%page_id, event = event.name(), "notify on unknown page");
            return;
        };
        for conn in members.iter().filter(|conn| *conn != exclude) {
            self.send_to(conn, event.clone());
        }
    }

    /// Sends to every registered connection.
    pub fn notify_global(&self, event: &ServerEvent) {
        for sender in self.senders.values() {
            let _ = sender.send(event.clone());
        }
    }

    /// Routes each `(Recipient, ServerEvent)` pair, in order.
    pub fn dispatch(
        &self,
        registry: &SessionRegistry,
        events: Vec<(Recipient, ServerEvent)>,
    ) {
        for (recipient, event) in events {
            tracing::trace!(?recipient, event = event.name(), "dispatch");
            match recipient {
                Recipient::Connection(conn) => {
                    self.notify_connection(&conn, event)
                }
                Recipient::Page(page_id) => {
                    self.notify_page(registry, &page_id, &event)
                }
                Recipient::PageExcept(page_id, exclude) => self
                    .notify_all_except(registry, &page_id, &exclude, &event),
                Recipient::Everyone => self.notify_global(&event),
            }
        }
    }

    /// Silently drops if the receiver is gone.
    fn send_to(&self, conn: &ConnectionId, event: ServerEvent) {
        if let Some(sender) = self.senders.get(conn) {
            let _ = sender.send(event);
        }
    }
}
