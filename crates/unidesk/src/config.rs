//! Configuration loading from environment variables.

use anyhow::{Context, Result};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

pub const DEFAULT_DB_PATH: &str = "unidesk.db";
pub const DEFAULT_PORT: u16 = 8080;

/// Runtime settings. CLI flags override whatever is loaded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub database_path: PathBuf,
    pub host: IpAddr,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DB_PATH),
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    /// Load settings from the environment.
    ///
    /// Reads `UNIDESK_DB`, `UNIDESK_HOST` and `UNIDESK_PORT`, either from the
    /// environment or from a `.env` file. Unset variables keep their defaults.
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut settings = Self::default();

        if let Some(path) = lookup("UNIDESK_DB").filter(|v| !v.trim().is_empty()) {
            settings.database_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("UNIDESK_HOST") {
            settings.host = host
                .trim()
                .parse()
                .with_context(|| format!("UNIDESK_HOST is not an IP address: {host}"))?;
        }
        if let Some(port) = lookup("UNIDESK_PORT") {
            settings.port = port
                .trim()
                .parse()
                .with_context(|| format!("UNIDESK_PORT is not a valid port: {port}"))?;
        }

        Ok(settings)
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
