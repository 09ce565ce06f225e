//! Per-connection handler: register with the hub, then pump frames.
//!
//! Each accepted peer gets its own Tokio task running this handler.
//! The flow is:
//!   0. Finish the handshake (or serve the status banner and stop)
//!   1. Register an outbound channel with the hub (it greets the client)
//!   2. Loop: decode inbound frames → hub, encode hub events → socket
//!   3. On exit the guard reports the disconnect

use pagewire_protocol::{ClientEvent, Codec, ConnectionId};
use pagewire_relay::HubHandle;
use pagewire_transport::{
    Connection, Handshake, PendingConnection, WebSocketConnection,
};
use tokio::sync::mpsc;

use crate::PagewireError;

/// Drop guard that reports the disconnect when the handler exits.
///
/// This ensures cleanup happens even if the handler panics or returns an
/// error. Since `Drop` is synchronous, we spawn a fire-and-forget task.
struct DisconnectGuard {
    conn_id: ConnectionId,
    hub: HubHandle,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id.clone();
        let hub = self.hub.clone();
        tokio::spawn(async move {
            let _ = hub.disconnect(conn_id).await;
        });
    }
}

/// Takes a freshly accepted peer through its handshake, then serves it.
pub(crate) async fn handle_pending<C: Codec>(
    pending: PendingConnection,
    hub: HubHandle,
    codec: C,
) -> Result<(), PagewireError> {
    let peer = pending.peer_addr();
    match pending.complete().await? {
        Some(conn) => handle_connection(conn, hub, codec).await,
        None => {
            tracing::trace!(%peer, "status request served");
            Ok(())
        }
    }
}

/// Handles a single connection from handshake to close.
async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    hub: HubHandle,
    codec: C,
) -> Result<(), PagewireError> {
    let conn_id = conn.id().clone();
    tracing::debug!(%conn_id, "handling new connection");

    let (tx, mut outbound) = mpsc::unbounded_channel();
    hub.connect(conn_id.clone(), tx).await?;
    let _guard = DisconnectGuard {
        conn_id: conn_id.clone(),
        hub: hub.clone(),
    };

    loop {
        tokio::select! {
            incoming = conn.recv() => {
                let data = match incoming {
                    Ok(Some(data)) => data,
                    Ok(None) => {
                        tracing::debug!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };

                let event: ClientEvent = match codec.decode(&data) {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::debug!(
                            %conn_id, error = %e, "failed to decode event"
                        );
                        continue;
                    }
                };

                tracing::trace!(%conn_id, event = event.name(), "client event");
                hub.dispatch(conn_id.clone(), event).await?;
            }
            event = outbound.recv() => {
                // The hub dropped our sender: it has stopped.
                let Some(event) = event else { break };
                let bytes = codec.encode(&event)?;
                conn.send(&bytes).await?;
            }
        }
    }

    let _ = conn.close().await;
    // _guard drops here → disconnect fires.
    Ok(())
}
