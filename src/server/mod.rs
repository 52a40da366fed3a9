//! Serving loops.
//!
//! Two scheduling models share the same request cycle
//! ([`process`](crate::http::connection::process)):
//!
//! - **`reactor`**: one thread, a readiness registry and a [`Transport`]
//!   readiness query. Ready handles are served in ascending order per pass.
//! - **`listener`**: a tokio accept loop spawning one task per connection.
//!
//! [`Server`] picks one from [`Mode`].

pub mod listener;
pub mod reactor;
pub mod registry;
pub mod transport;

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::info;

use crate::config::{Mode, ServerConfig};
use crate::router::Router;

pub use reactor::Multiplexer;
pub use registry::{Handle, ReadinessRegistry, RegistryError};
pub use transport::{MioTransport, Transport};

/// Conditions that stop the server. Everything else is handled per
/// connection.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("readiness query failed: {0}")]
    Readiness(#[source] io::Error),
    #[error(transparent)]
    Capacity(#[from] RegistryError),
}

pub struct Server {
    config: ServerConfig,
    router: Arc<Router>,
}

impl Server {
    pub fn new(config: ServerConfig, router: Router) -> Self {
        Self {
            config,
            router: Arc::new(router),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Binds the configured address and builds a reactor over it.
    pub fn reactor(&self) -> Result<Multiplexer<MioTransport>, ServerError> {
        let addr = self.config.socket_addr();
        let transport = MioTransport::bind(addr).map_err(|source| ServerError::Bind { addr, source })?;

        info!("Reactor bound to {}", addr);

        Ok(Multiplexer::new(
            transport,
            Arc::clone(&self.router),
            self.config.max_connections,
            self.config.read_buffer_size,
        )?
        .with_poll_timeout(self.config.poll_timeout()))
    }

    /// Serves with the configured scheduling model until a fatal error.
    pub async fn run(self) -> anyhow::Result<()> {
        match self.config.mode {
            Mode::Reactor => {
                let mut reactor = self.reactor()?;
                let (tx, rx) = oneshot::channel();

                // off the runtime; ctrl-c must not wait on a blocked poll
                std::thread::Builder::new()
                    .name("rawserve-reactor".to_string())
                    .spawn(move || {
                        let _ = tx.send(reactor.run());
                    })
                    .context("failed to spawn reactor thread")?;

                rx.await.context("reactor thread exited")??;
            }
            Mode::Threaded => {
                let addr = self.config.socket_addr();
                let listener = TcpListener::bind(addr)
                    .await
                    .with_context(|| format!("failed to bind {addr}"))?;
                listener::serve(listener, self.router, self.config.read_buffer_size).await?;
            }
        }

        Ok(())
    }
}
