//! Single-threaded connection multiplexer.
//!
//! One thread owns the registry and drives every connection. Each pass:
//!
//! 1. snapshot the watched handles,
//! 2. ask the transport which of them are readable,
//! 3. in ascending handle order, accept on the listener or serve a client.
//!
//! Serving a client reads once, runs the request through the router, writes
//! the response and closes the connection. Nothing is kept between requests.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::http::connection::process;
use crate::http::writer::ResponseWriter;
use crate::router::Router;
use crate::server::ServerError;
use crate::server::registry::{Handle, ReadinessRegistry};
use crate::server::transport::Transport;

pub struct Multiplexer<T: Transport> {
    transport: T,
    registry: ReadinessRegistry,
    router: Arc<Router>,
    read_buffer_size: usize,
    poll_timeout: Option<Duration>,
    /// Set when accepting stopped before `WouldBlock`; the listener is then
    /// retried on the next pass without waiting for a new event.
    backlog_pending: bool,
}

/// Upper bound on the readiness wait while the backlog still holds
/// connections.
const ACCEPT_RETRY: Duration = Duration::from_millis(10);

/// Accept failures that concern one connection only. The listener itself is
/// fine and the next pending connection can be taken right away.
fn is_connection_error(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::PermissionDenied
            | io::ErrorKind::TimedOut
    )
}

impl<T: Transport> Multiplexer<T> {
    /// Takes ownership of the transport and starts watching its listener.
    pub fn new(
        transport: T,
        router: Arc<Router>,
        capacity: usize,
        read_buffer_size: usize,
    ) -> Result<Self, ServerError> {
        let mut registry = ReadinessRegistry::new(capacity);
        registry.zero();
        registry.watch(transport.listener())?;

        Ok(Self {
            transport,
            registry,
            router,
            read_buffer_size,
            poll_timeout: None,
            backlog_pending: false,
        })
    }

    /// Makes each readiness query return after `timeout` even if nothing is
    /// ready. `None` blocks.
    pub fn with_poll_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &ReadinessRegistry {
        &self.registry
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serves until a fatal error occurs.
    pub fn run(&mut self) -> Result<(), ServerError> {
        info!(capacity = self.registry.capacity(), "Reactor started");

        loop {
            if let Err(e) = self.run_once() {
                error!(error = %e, "Reactor stopped");
                return Err(e);
            }
        }
    }

    /// Runs one readiness pass and returns how many ready handles it handled.
    pub fn run_once(&mut self) -> Result<usize, ServerError> {
        let watched = self.registry.snapshot();
        let listener = self.transport.listener();

        let timeout = if self.backlog_pending {
            Some(self.poll_timeout.map_or(ACCEPT_RETRY, |t| t.min(ACCEPT_RETRY)))
        } else {
            self.poll_timeout
        };

        let mut ready = self
            .transport
            .ready(&watched, timeout)
            .map_err(ServerError::Readiness)?;
        if self.backlog_pending {
            ready.push(listener);
        }
        ready.sort_unstable();
        ready.dedup();

        let mut handled = 0;

        for handle in ready {
            if handle == listener {
                self.accept_pending()?;
            } else if self.registry.is_watched(handle) {
                self.serve(handle);
            } else {
                continue;
            }
            handled += 1;
        }

        Ok(handled)
    }

    /// Accepts until the listener reports `WouldBlock`.
    ///
    /// Readiness is edge-triggered, so stopping early strands the rest of the
    /// backlog. A failure tied to one connection is skipped; any other accept
    /// failure (e.g. out of file descriptors) ends this pass and marks the
    /// backlog for retry on the next one. Running out of registry slots is
    /// fatal.
    fn accept_pending(&mut self) -> Result<(), ServerError> {
        self.backlog_pending = false;

        loop {
            match self.transport.accept() {
                Ok((handle, peer)) => {
                    if let Err(e) = self.registry.watch_peer(handle, peer) {
                        self.transport.close(handle);
                        return Err(e.into());
                    }
                    debug!(%handle, %peer, "Accepted connection");
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if is_connection_error(e.kind()) => {
                    warn!(error = %e, "Accept failed, skipping connection");
                }
                Err(e) => {
                    warn!(error = %e, "Accept failed, retrying next pass");
                    self.backlog_pending = true;
                    return Ok(());
                }
            }
        }
    }

    /// One read → parse → dispatch → write → close cycle.
    fn serve(&mut self, handle: Handle) {
        let peer = self.registry.address_of(handle);
        let mut buf = vec![0u8; self.read_buffer_size];

        let n = match self.transport.recv(handle, &mut buf) {
            Ok(0) => {
                debug!(%handle, ?peer, "Peer disconnected");
                self.disconnect(handle);
                return;
            }
            Ok(n) => n,
            // spurious wakeup, data not there yet
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
            Err(e) => {
                warn!(%handle, ?peer, error = %e, "Read failed");
                self.disconnect(handle);
                return;
            }
        };

        let response = process(&self.router, &buf[..n]);
        let writer = ResponseWriter::new(&response);

        if let Err(e) = self.transport.send(handle, writer.as_bytes()) {
            warn!(%handle, ?peer, error = %e, "Write failed");
        }

        self.disconnect(handle);
    }

    fn disconnect(&mut self, handle: Handle) {
        self.registry.forget(handle);
        self.transport.close(handle);
    }
}
