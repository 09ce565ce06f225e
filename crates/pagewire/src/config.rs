//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (`SERVICE_NAME`, `HOST`, `PORT`, `PAGE_TTL_SECS`),
//!   which a `.env` file may supply
//! - A TOML file named by `PAGEWIRE_CONFIG`, or `./pagewire.toml`

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use pagewire_expiry::{ExpiryConfig, ExpiryPolicy};
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Env var naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "PAGEWIRE_CONFIG";

/// Config file looked for in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "pagewire.toml";

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Name shown in the status banner.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Page lifetime in seconds.
    #[serde(default = "default_page_ttl_secs")]
    pub page_ttl_secs: u64,

    /// Whether activity renews a page's lifetime.
    #[serde(default)]
    pub expiry_policy: ExpiryPolicy,
}

// Default value functions
fn default_service_name() -> String {
    std::env::var("SERVICE_NAME").unwrap_or_else(|_| "pagewire".to_string())
}

fn default_host() -> String {
    std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string())
}

fn default_port() -> u16 {
    std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8800)
}

fn default_page_ttl_secs() -> u64 {
    std::env::var("PAGE_TTL_SECS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(60)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            host: default_host(),
            port: default_port(),
            page_ttl_secs: default_page_ttl_secs(),
            expiry_policy: ExpiryPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `PAGEWIRE_CONFIG` names a file that cannot be
    /// read, or if the file found cannot be parsed.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }
        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_file(DEFAULT_CONFIG_FILE);
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents =
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if `host` is not an IP.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidAddress(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// The expiry settings for the relay hub.
    pub fn expiry_config(&self) -> ExpiryConfig {
        ExpiryConfig {
            ttl: Duration::from_secs(self.page_ttl_secs),
            policy: self.expiry_policy,
        }
    }
}

/// Body of the plain HTTP status reply.
pub fn status_banner(service_name: &str, port: u16) -> String {
    format!("{service_name}  ---> start at port {port}")
}
