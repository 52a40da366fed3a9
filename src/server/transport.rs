//! Transport boundary used by the reactor.
//!
//! The reactor only needs "listen, tell me which watched handles are
//! readable, accept, recv, send, close". [`Transport`] captures exactly that
//! so the reactor can run over `mio` or over a scripted transport in tests.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr};
use std::time::Duration;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, trace};

use crate::server::registry::Handle;

/// The listening socket is always handle 0 in [`MioTransport`].
pub const LISTENER: Handle = Handle(0);

const EVENTS_CAPACITY: usize = 1024;

pub trait Transport {
    /// Handle of the listening socket.
    fn listener(&self) -> Handle;

    /// Blocks until at least one of `watched` is readable (or `timeout`
    /// elapses) and returns the readable ones. An error here is fatal for
    /// the server.
    fn ready(&mut self, watched: &[Handle], timeout: Option<Duration>) -> io::Result<Vec<Handle>>;

    /// Accepts one pending connection. `WouldBlock` means none is pending.
    fn accept(&mut self) -> io::Result<(Handle, SocketAddr)>;

    /// Reads once into `buf`. `Ok(0)` means the peer closed.
    fn recv(&mut self, handle: Handle, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes all of `bytes`.
    fn send(&mut self, handle: Handle, bytes: &[u8]) -> io::Result<()>;

    /// Closes a connection handle. Closing an unknown handle does nothing.
    fn close(&mut self, handle: Handle);
}

/// Non-blocking TCP transport backed by `mio`.
///
/// Accepted streams are stored in a slot table; a stream's slot index is its
/// handle, and freed slots are reused lowest-first like file descriptors.
pub struct MioTransport {
    poll: Poll,
    events: Events,
    listener: TcpListener,
    streams: Vec<Option<TcpStream>>,
}

impl MioTransport {
    /// Binds a non-blocking listener and registers it for readability.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let poll = Poll::new()?;
        let mut listener = TcpListener::bind(addr)?;

        poll.registry()
            .register(&mut listener, Token(LISTENER.0), Interest::READABLE)?;

        Ok(Self {
            poll,
            events: Events::with_capacity(EVENTS_CAPACITY),
            listener,
            // slot 0 belongs to the listener
            streams: vec![None],
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    fn free_slot(&mut self) -> usize {
        match self.streams.iter().skip(1).position(Option::is_none) {
            Some(i) => i + 1,
            None => {
                self.streams.push(None);
                self.streams.len() - 1
            }
        }
    }

    fn stream(&mut self, handle: Handle) -> io::Result<&mut TcpStream> {
        self.streams
            .get_mut(handle.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown handle {handle}")))
    }
}

impl Transport for MioTransport {
    fn listener(&self) -> Handle {
        LISTENER
    }

    fn ready(&mut self, watched: &[Handle], timeout: Option<Duration>) -> io::Result<Vec<Handle>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        let mut ready: Vec<Handle> = self
            .events
            .iter()
            .filter(|event| event.is_readable() || event.is_read_closed() || event.is_error())
            .map(|event| Handle(event.token().0))
            .filter(|handle| watched.contains(handle))
            .collect();

        ready.sort_unstable();
        ready.dedup();
        trace!(count = ready.len(), "Readiness pass");

        Ok(ready)
    }

    fn accept(&mut self) -> io::Result<(Handle, SocketAddr)> {
        let (mut stream, peer) = self.listener.accept()?;

        let slot = self.free_slot();
        self.poll
            .registry()
            .register(&mut stream, Token(slot), Interest::READABLE)?;
        self.streams[slot] = Some(stream);

        Ok((Handle(slot), peer))
    }

    fn recv(&mut self, handle: Handle, buf: &mut [u8]) -> io::Result<usize> {
        let stream = self.stream(handle)?;
        loop {
            match stream.read(buf) {
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }

    fn send(&mut self, handle: Handle, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream(handle)?;
        let mut written = 0;

        // the socket is non-blocking; spin until the kernel takes everything
        while written < bytes.len() {
            match stream.write(&bytes[written..]) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => std::thread::yield_now(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }

        stream.flush()
    }

    fn close(&mut self, handle: Handle) {
        let Some(mut stream) = self.streams.get_mut(handle.0).and_then(Option::take) else {
            return;
        };

        if let Err(e) = self.poll.registry().deregister(&mut stream) {
            debug!(%handle, error = %e, "Deregister failed");
        }
        if let Err(e) = stream.shutdown(Shutdown::Both) {
            trace!(%handle, error = %e, "Shutdown failed");
        }
    }
}
