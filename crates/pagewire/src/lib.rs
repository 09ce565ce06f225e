//! # Pagewire
//!
//! Real-time page collaboration relay over WebSockets.
//!
//! Clients create named pages, join them, and push the page's content;
//! the relay keeps the latest content per page, forwards each update to
//! the page's other members, and tears every page down after its
//! lifetime (60 seconds by default).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagewire::prelude::*;
//!
//! # async fn start() -> Result<(), PagewireError> {
//! let config = ServerConfig::load()?;
//! let server = PagewireServer::builder().config(&config)?.build().await?;
//! server.run().await
//! # }
//! ```

mod config;
mod error;
mod handler;
mod server;

pub use config::{CONFIG_PATH_ENV, DEFAULT_CONFIG_FILE, ServerConfig, status_banner};
pub use error::{ConfigError, PagewireError};
pub use server::{PagewireServer, PagewireServerBuilder};

/// Convenience re-exports for running and talking to a relay.
pub mod prelude {
    pub use crate::{
        ConfigError, PagewireError, PagewireServer, PagewireServerBuilder,
        ServerConfig,
    };
    pub use pagewire_expiry::{ExpiryConfig, ExpiryPolicy};
    pub use pagewire_protocol::{
        ClientEvent, Codec, ConnectionId, JsonCodec, PageId, ServerEvent,
    };
    pub use pagewire_relay::{HubHandle, RelayError};
    pub use pagewire_session::SessionError;
    pub use pagewire_transport::TransportError;
}
