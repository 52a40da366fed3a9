use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming a YAML config file.
pub const CONFIG_ENV: &str = "RAWSERVE_CONFIG";

/// Scheduling model used to serve connections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Single-threaded readiness loop
    #[default]
    Reactor,
    /// One tokio task per connection
    Threaded,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reactor" => Ok(Mode::Reactor),
            "threaded" => Ok(Mode::Threaded),
            other => anyhow::bail!("unknown mode {other:?}, expected \"reactor\" or \"threaded\""),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IPv4/IPv6 address to bind; unparsable values fall back to loopback
    pub bind_address: String,
    pub port: u16,
    /// Upper bound on simultaneously watched handles in the reactor
    pub max_connections: usize,
    /// Size of the single read per request; longer requests are truncated
    pub read_buffer_size: usize,
    pub mode: Mode,
    pub poll_timeout_ms: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            max_connections: 1024,
            read_buffer_size: 8000,
            mode: Mode::Reactor,
            poll_timeout_ms: None,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        let ip = self.bind_address.parse::<IpAddr>().unwrap_or_else(|_| {
            tracing::warn!(address = %self.bind_address, "Invalid bind address, using loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        });
        SocketAddr::new(ip, self.port)
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }
}

impl Config {
    pub fn from_yaml(source: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(source).context("invalid YAML config")
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_yaml(&source)
    }

    /// Loads the file named by `RAWSERVE_CONFIG` (defaults when unset), then
    /// applies `BIND_ADDRESS`, `PORT` and `MODE` overrides from the
    /// environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(addr) = std::env::var("BIND_ADDRESS") {
            cfg.server.bind_address = addr;
        }
        if let Ok(port) = std::env::var("PORT") {
            cfg.server.port = port
                .parse()
                .with_context(|| format!("invalid PORT {port:?}"))?;
        }
        if let Ok(mode) = std::env::var("MODE") {
            cfg.server.mode = mode.parse()?;
        }

        Ok(cfg)
    }
}
