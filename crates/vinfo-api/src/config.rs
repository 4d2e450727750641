//! HTTP server settings.

use vinfo_core::{defaults, Error, Result};

/// Bind address and process layout of the API server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Run a job worker inside the API process.
    pub embedded_worker: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: defaults::SERVER_HOST.to_string(),
            port: defaults::SERVER_PORT,
            embedded_worker: false,
        }
    }
}

impl ServerConfig {
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `VI_SERVER_HOST` | `0.0.0.0` | Bind host |
    /// | `VI_SERVER_PORT` | `8080` | Bind port |
    /// | `VI_WORKER_ENABLED` | `false` | Embedded worker |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let host = lookup("VI_SERVER_HOST")
            .filter(|v| !v.is_empty())
            .unwrap_or(defaults.host);

        let port = match lookup("VI_SERVER_PORT").filter(|v| !v.is_empty()) {
            Some(raw) => raw.parse().map_err(|_| {
                Error::Config(format!("VI_SERVER_PORT must be a port number, got {:?}", raw))
            })?,
            None => defaults.port,
        };

        let embedded_worker = lookup("VI_WORKER_ENABLED")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(defaults.embedded_worker);

        Ok(Self {
            host,
            port,
            embedded_worker,
        })
    }

    /// Address to bind; host names are resolved by the listener.
    pub fn bind_addr(&self) -> (&str, u16) {
        (self.host.as_str(), self.port)
    }
}
