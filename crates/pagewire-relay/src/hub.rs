//! Hub actor: the one task that owns the registry.
//!
//! Connection tasks never see the registry. They hold a [`HubHandle`] and
//! send it commands over a bounded channel; the hub applies them one at a
//! time and, in the same `select!` loop, applies page expiries as their
//! timers fire.

use pagewire_expiry::ExpiryConfig;
use pagewire_protocol::{ClientEvent, ConnectionId, PageId};
use tokio::sync::{mpsc, oneshot};

use crate::{EventSender, Lifecycle, LifecycleEvent, Relay, RelayError};

/// Commands sent to the hub through its channel.
pub(crate) enum HubCommand {
    /// Register a new connection and its outbound channel.
    Connect {
        conn: ConnectionId,
        sender: EventSender,
    },

    /// Apply a client event.
    Event {
        conn: ConnectionId,
        event: ClientEvent,
    },

    /// The connection closed.
    Disconnect { conn: ConnectionId },

    /// Request the current page list.
    ListPages { reply: oneshot::Sender<Vec<PageId>> },

    /// Stop the hub.
    Shutdown,
}

/// Handle to the running hub. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HubHandle {
    sender: mpsc::Sender<HubCommand>,
}

impl HubHandle {
    /// Registers `conn`; it receives `connected` and the page list.
    pub async fn connect(
        &self,
        conn: ConnectionId,
        sender: EventSender,
    ) -> Result<(), RelayError> {
        self.send(HubCommand::Connect { conn, sender }).await
    }

    /// Delivers a client event (fire-and-forget).
    pub async fn dispatch(
        &self,
        conn: ConnectionId,
        event: ClientEvent,
    ) -> Result<(), RelayError> {
        self.send(HubCommand::Event { conn, event }).await
    }

    /// Reports that `conn` closed.
    pub async fn disconnect(&self, conn: ConnectionId) -> Result<(), RelayError> {
        self.send(HubCommand::Disconnect { conn }).await
    }

    /// All page ids, in creation order.
    pub async fn list_pages(&self) -> Result<Vec<PageId>, RelayError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(HubCommand::ListPages { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| RelayError::HubUnavailable)
    }

    /// Tells the hub to stop. Pending timers are dropped with it.
    pub async fn shutdown(&self) -> Result<(), RelayError> {
        self.send(HubCommand::Shutdown).await
    }

    /// Returns `true` once the hub has stopped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    async fn send(&self, cmd: HubCommand) -> Result<(), RelayError> {
        self.sender
            .send(cmd)
            .await
            .map_err(|_| RelayError::HubUnavailable)
    }
}

/// The hub actor state. Runs inside a Tokio task.
pub struct Hub {
    lifecycle: Lifecycle,
    relay: Relay,
    receiver: mpsc::Receiver<HubCommand>,
}

impl Hub {
    /// Capacity of the command channel.
    pub const CHANNEL_SIZE: usize = 256;

    /// Runs the actor loop until shutdown or until every handle is gone.
    async fn run(mut self) {
        tracing::info!(
            ttl_ms = self.lifecycle.ttl().as_millis() as u64,
            "relay hub started"
        );

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                Some(expired) = self.lifecycle.next_expired() => {
                    tracing::debug!(page_id = %expired.key, "page timer fired");
                    let out = self.lifecycle.handle_expiry(expired);
                    self.relay.dispatch(self.lifecycle.registry(), out);
                }
            }
        }

        tracing::info!(
            pages = self.lifecycle.registry().len(),
            connections = self.lifecycle.connection_count(),
            "relay hub stopped"
        );
    }

    /// Returns `false` when the hub should stop.
    fn handle_command(&mut self, cmd: HubCommand) -> bool {
        match cmd {
            HubCommand::Connect { conn, sender } => {
                self.relay.register(conn.clone(), sender);
                self.apply(&conn, LifecycleEvent::Connected);
            }
            HubCommand::Event { conn, event } => {
                self.apply(&conn, LifecycleEvent::Client(event));
            }
            HubCommand::Disconnect { conn } => {
                self.relay.unregister(&conn);
                self.apply(&conn, LifecycleEvent::Disconnected);
            }
            HubCommand::ListPages { reply } => {
                let _ = reply.send(self.lifecycle.registry().list_pages());
            }
            HubCommand::Shutdown => {
                tracing::info!("relay hub shutting down");
                return false;
            }
        }
        true
    }

    fn apply(&mut self, conn: &ConnectionId, event: LifecycleEvent) {
        let out = self.lifecycle.handle(conn, event);
        self.relay.dispatch(self.lifecycle.registry(), out);
    }
}

/// Spawns the hub task and returns a handle to it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_hub(expiry: ExpiryConfig) -> HubHandle {
    let (tx, rx) = mpsc::channel(Hub::CHANNEL_SIZE);

    let hub = Hub {
        lifecycle: Lifecycle::new(expiry),
        relay: Relay::new(),
        receiver: rx,
    };

    tokio::spawn(hub.run());

    HubHandle { sender: tx }
}
