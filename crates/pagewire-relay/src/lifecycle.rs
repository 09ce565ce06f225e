//! Per-connection state machine and event handling.
//!
//! [`Lifecycle::handle`] is the single entry point for everything a
//! connection can do. It mutates the registry and returns the events to
//! deliver instead of sending them, so it can be driven in tests without
//! sockets or a running hub.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use pagewire_expiry::{Expired, ExpiryConfig, ExpiryScheduler};
use pagewire_protocol::{
    ClientEvent, ConnectionId, PageId, Recipient, ServerEvent,
};
use pagewire_session::SessionRegistry;

/// Everything that can happen to a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The transport accepted the connection.
    Connected,
    /// The client sent an event.
    Client(ClientEvent),
    /// The transport reported the connection closed.
    Disconnected,
}

/// Where a connection is in its lifecycle.
///
/// ```text
/// Unjoined ──join ok──→ Joined ──page expires──→ Unjoined
///     │                   │
///     └────disconnect─────┴──→ Disconnected (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Connected, not in any page.
    Unjoined,
    /// Connected and a member of a page.
    Joined,
    /// Closed, or never seen. Events are ignored.
    Disconnected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unjoined => write!(f, "Unjoined"),
            Self::Joined => write!(f, "Joined"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

/// Owns the registry and the expiry scheduler and applies events to them.
pub struct Lifecycle {
    registry: SessionRegistry,
    scheduler: ExpiryScheduler<PageId>,
    states: HashMap<ConnectionId, ConnectionState>,
}

impl Lifecycle {
    /// Creates an empty lifecycle with its own expiry scheduler.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(expiry: ExpiryConfig) -> Self {
        Self {
            registry: SessionRegistry::new(),
            scheduler: ExpiryScheduler::new(expiry),
            states: HashMap::new(),
        }
    }

    /// Read access to the registry, for resolving recipients.
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// The connection's current state.
    pub fn state(&self, conn: &ConnectionId) -> ConnectionState {
        self.states
            .get(conn)
            .copied()
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// The configured page lifetime.
    pub fn ttl(&self) -> Duration {
        self.scheduler.ttl()
    }

    /// Number of open connections.
    pub fn connection_count(&self) -> usize {
        self.states.len()
    }

    /// Waits for the next page timer to fire.
    pub async fn next_expired(&mut self) -> Option<Expired<PageId>> {
        self.scheduler.next_expired().await
    }

    /// Applies one event from `conn` and returns what to deliver.
    pub fn handle(
        &mut self,
        conn: &ConnectionId,
        event: LifecycleEvent,
    ) -> Vec<(Recipient, ServerEvent)> {
        match event {
            LifecycleEvent::Connected => self.on_connected(conn),
            LifecycleEvent::Client(event) => {
                if self.state(conn) == ConnectionState::Disconnected {
                    tracing::debug!(
                        %conn,
                        event = event.name(),
                        "event from closed connection, ignoring"
                    );
                    return Vec::new();
                }
                match event {
                    ClientEvent::NewPageAdd(page_id) => {
                        self.on_page_create(page_id)
                    }
                    ClientEvent::NewUserAdd(page_id) => {
                        self.on_user_join(conn, page_id)
                    }
                    ClientEvent::SendMessage {
                        new_page_id,
                        message,
                        session_id,
                    } => self.on_send_message(new_page_id, message, session_id),
                }
            }
            LifecycleEvent::Disconnected => self.on_disconnected(conn),
        }
    }

    /// Applies a fired timer.
    ///
    /// A stale notice (the page was renewed or recreated since) changes
    /// nothing. Otherwise every member gets `session-expire`, then the
    /// page is gone and the new page list goes to everyone.
    pub fn handle_expiry(
        &mut self,
        expired: Expired<PageId>,
    ) -> Vec<(Recipient, ServerEvent)> {
        let Some(members) =
            self.registry.expire(&expired.key, expired.generation)
        else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(members.len() + 1);
        for conn in members {
            if let Some(state) = self.states.get_mut(&conn) {
                *state = ConnectionState::Unjoined;
            }
            out.push((Recipient::Connection(conn), ServerEvent::session_expired()));
        }
        out.push((Recipient::Everyone, self.page_list()));
        out
    }

    fn on_connected(
        &mut self,
        conn: &ConnectionId,
    ) -> Vec<(Recipient, ServerEvent)> {
        self.states.insert(conn.clone(), ConnectionState::Unjoined);
        tracing::debug!(%conn, connections = self.states.len(), "connected");
        vec![
            (
                Recipient::Connection(conn.clone()),
                ServerEvent::Connected { id: conn.clone() },
            ),
            (Recipient::Connection(conn.clone()), self.page_list()),
        ]
    }

    fn on_page_create(
        &mut self,
        page_id: PageId,
    ) -> Vec<(Recipient, ServerEvent)> {
        self.registry.create_page(page_id, &mut self.scheduler);
        tracing::info!(pages = ?self.registry.list_pages(), "active pages");
        vec![(Recipient::Everyone, self.page_list())]
    }

    fn on_user_join(
        &mut self,
        conn: &ConnectionId,
        page_id: PageId,
    ) -> Vec<(Recipient, ServerEvent)> {
        let outcome = match self.registry.join_page(&page_id, conn) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::info!(%conn, %err, "join rejected");
                return vec![(
                    Recipient::Connection(conn.clone()),
                    ServerEvent::invalid_session(),
                )];
            }
        };

        self.states.insert(conn.clone(), ConnectionState::Joined);
        self.renew(&page_id);

        vec![
            (
                Recipient::Connection(conn.clone()),
                ServerEvent::OtherUsersData(outcome.shared_state),
            ),
            (Recipient::Everyone, self.page_list()),
        ]
    }

    fn on_send_message(
        &mut self,
        page_id: PageId,
        message: String,
        exclude: ConnectionId,
    ) -> Vec<(Recipient, ServerEvent)> {
        if !self.registry.update_shared_state(&page_id, message.clone()) {
            tracing::debug!(%page_id, "message for unknown page dropped");
            return Vec::new();
        }
        self.renew(&page_id);
        tracing::trace!(%page_id, %exclude, len = message.len(), "relaying message");

        vec![(
            Recipient::PageExcept(page_id.clone(), exclude),
            ServerEvent::ReceiveMessage {
                new_page_id: page_id,
                message,
            },
        )]
    }

    fn on_disconnected(
        &mut self,
        conn: &ConnectionId,
    ) -> Vec<(Recipient, ServerEvent)> {
        if self.states.remove(conn).is_none() {
            return Vec::new();
        }
        self.registry.leave_page(conn);
        tracing::debug!(%conn, connections = self.states.len(), "disconnected");
        vec![(Recipient::Everyone, self.page_list())]
    }

    /// Restarts the page timer under the idle-timeout policy.
    fn renew(&mut self, page_id: &PageId) {
        if self.scheduler.config().renews_on_activity() {
            self.registry.touch(page_id, &mut self.scheduler);
        }
    }

    fn page_list(&self) -> ServerEvent {
        ServerEvent::GetPages(self.registry.list_pages())
    }
}

impl fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lifecycle")
            .field("registry", &self.registry)
            .field("states", &self.states)
            .finish_non_exhaustive()
    }
}
