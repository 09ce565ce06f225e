//! `PagewireServer` builder and server loop.
//!
//! This is the entry point for running a relay. It ties together all the
//! layers: transport → protocol → relay hub → session registry.

use std::time::Duration;

use pagewire_expiry::ExpiryConfig;
use pagewire_protocol::JsonCodec;
use pagewire_relay::{HubHandle, spawn_hub};
use pagewire_transport::{Transport, TransportError, WebSocketTransport};

use crate::config::status_banner;
use crate::handler::handle_pending;
use crate::{PagewireError, ServerConfig};

/// Builder for configuring and starting a Pagewire server.
///
/// # Example
///
/// ```rust,ignore
/// use pagewire::prelude::*;
///
/// let server = PagewireServer::builder()
///     .bind("0.0.0.0:8800")
///     .service_name("docs")
///     .build()
///     .await?;
/// server.run().await
/// ```
pub struct PagewireServerBuilder {
    bind_addr: String,
    service_name: String,
    expiry: ExpiryConfig,
}

impl PagewireServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            bind_addr: "127.0.0.1:8800".to_string(),
            service_name: "pagewire".to_string(),
            expiry: ExpiryConfig::default(),
        }
    }

    /// Takes every setting from a loaded [`ServerConfig`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configured host is not an IP address.
    pub fn config(self, config: &ServerConfig) -> Result<Self, PagewireError> {
        let addr = config.bind_addr()?;
        Ok(self
            .bind(&addr.to_string())
            .service_name(&config.service_name)
            .expiry_config(config.expiry_config()))
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.bind_addr = addr.to_string();
        self
    }

    /// Sets the name shown in the status banner.
    pub fn service_name(mut self, name: &str) -> Self {
        self.service_name = name.to_string();
        self
    }

    /// Sets page lifetime and renewal policy.
    pub fn expiry_config(mut self, config: ExpiryConfig) -> Self {
        self.expiry = config;
        self
    }

    /// Binds the listener and starts the relay hub.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn build(self) -> Result<PagewireServer, PagewireError> {
        let transport = WebSocketTransport::bind(&self.bind_addr).await?;
        let port = transport
            .local_addr()
            .map_err(TransportError::AcceptFailed)?
            .port();
        let transport =
            transport.with_status_banner(status_banner(&self.service_name, port));

        let hub = spawn_hub(self.expiry);

        Ok(PagewireServer {
            transport,
            hub,
            codec: JsonCodec,
            service_name: self.service_name,
        })
    }
}

impl Default for PagewireServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Pagewire relay.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct PagewireServer {
    transport: WebSocketTransport,
    hub: HubHandle,
    codec: JsonCodec,
    service_name: String,
}

impl PagewireServer {
    /// Pause after a failed accept, so a persistent error (e.g. out of
    /// file descriptors) does not spin the loop.
    const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

    /// Creates a new builder.
    pub fn builder() -> PagewireServerBuilder {
        PagewireServerBuilder::new()
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// A handle to the relay hub, e.g. to shut it down.
    pub fn hub(&self) -> HubHandle {
        self.hub.clone()
    }

    /// Runs the server accept loop.
    ///
    /// Accepts incoming peers and spawns a task for each one; the
    /// handshake runs on that task, never on this loop. Returns once the
    /// relay hub has stopped.
    pub async fn run(mut self) -> Result<(), PagewireError> {
        let port = self.transport.local_addr().map(|a| a.port()).unwrap_or(0);
        tracing::info!("{}", status_banner(&self.service_name, port));

        while !self.hub.is_closed() {
            match self.transport.accept().await {
                Ok(pending) => {
                    let hub = self.hub.clone();
                    let codec = self.codec;
                    tokio::spawn(async move {
                        match handle_pending(pending, hub, codec).await {
                            Ok(()) => {}
                            Err(PagewireError::Transport(
                                TransportError::HandshakeFailed(reason),
                            )) => {
                                tracing::debug!(%reason, "WebSocket handshake failed");
                            }
                            Err(e) => {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        }
                    });
                }
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                    tokio::time::sleep(Self::ACCEPT_BACKOFF).await;
                }
            }
        }

        tracing::info!("relay hub stopped, server exiting");
        Ok(())
    }
}
