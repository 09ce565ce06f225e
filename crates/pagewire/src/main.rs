//! # Pagewire Server
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings (0.0.0.0:8800, 60s pages)
//! pagewire
//!
//! # Run with a config file
//! PAGEWIRE_CONFIG=/path/to/pagewire.toml pagewire
//!
//! # Run with environment variables (or a .env file)
//! PORT=9000 SERVICE_NAME=docs pagewire
//! ```

use pagewire::prelude::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), PagewireError> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pagewire=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::load()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        page_ttl_secs = config.page_ttl_secs,
        policy = ?config.expiry_policy,
        "starting pagewire"
    );

    let server = PagewireServer::builder().config(&config)?.build().await?;
    let hub = server.hub();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            let _ = hub.shutdown().await;
        }
    }

    Ok(())
}
