use std::collections::{HashMap, VecDeque};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rawserve::router::Router;
use rawserve::server::{Handle, Multiplexer, ServerError, Transport};

const LISTENER: Handle = Handle(0);

/// Transport that replays a script instead of touching sockets.
#[derive(Default)]
struct ScriptedTransport {
    rounds: VecDeque<io::Result<Vec<Handle>>>,
    accepts: VecDeque<io::Result<(Handle, SocketAddr)>>,
    reads: HashMap<Handle, VecDeque<io::Result<Vec<u8>>>>,
    failing_sends: Vec<Handle>,
    watched_seen: Vec<Vec<Handle>>,
    timeouts_seen: Vec<Option<Duration>>,
    sent: Vec<(Handle, Vec<u8>)>,
    closed: Vec<Handle>,
}

impl ScriptedTransport {
    fn round(mut self, ready: &[usize]) -> Self {
        self.rounds.push_back(Ok(ready.iter().copied().map(Handle).collect()));
        self
    }

    fn accept(mut self, handle: usize) -> Self {
        self.accepts.push_back(Ok((Handle(handle), peer(40000 + handle as u16))));
        self
    }

    fn accept_err(mut self, err: io::Error) -> Self {
        self.accepts.push_back(Err(err));
        self
    }

    fn read(mut self, handle: usize, data: &[u8]) -> Self {
        self.reads
            .entry(Handle(handle))
            .or_default()
            .push_back(Ok(data.to_vec()));
        self
    }

    fn read_err(mut self, handle: usize, kind: io::ErrorKind) -> Self {
        self.reads
            .entry(Handle(handle))
            .or_default()
            .push_back(Err(kind.into()));
        self
    }

    fn sent_text(&self, handle: usize) -> String {
        let (_, bytes) = self
            .sent
            .iter()
            .find(|(h, _)| *h == Handle(handle))
            .expect("nothing sent to handle");
        String::from_utf8_lossy(bytes).into_owned()
    }
}

impl Transport for ScriptedTransport {
    fn listener(&self) -> Handle {
        LISTENER
    }

    fn ready(&mut self, watched: &[Handle], timeout: Option<Duration>) -> io::Result<Vec<Handle>> {
        self.watched_seen.push(watched.to_vec());
        self.timeouts_seen.push(timeout);
        self.rounds
            .pop_front()
            .unwrap_or_else(|| Err(io::Error::other("script exhausted")))
    }

    fn accept(&mut self) -> io::Result<(Handle, SocketAddr)> {
        self.accepts
            .pop_front()
            .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))
    }

    fn recv(&mut self, handle: Handle, buf: &mut [u8]) -> io::Result<usize> {
        let next = self
            .reads
            .get_mut(&handle)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))?;

        let n = next.len().min(buf.len());
        buf[..n].copy_from_slice(&next[..n]);
        Ok(n)
    }

    fn send(&mut self, handle: Handle, bytes: &[u8]) -> io::Result<()> {
        if self.failing_sends.contains(&handle) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        self.sent.push((handle, bytes.to_vec()));
        Ok(())
    }

    fn close(&mut self, handle: Handle) {
        self.closed.push(handle);
    }
}

fn peer(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

fn echo_router() -> Arc<Router> {
    let mut router = Router::new();
    router.register("/a", |res, _| {
        res.set_status_code(200);
        res.set_body("a");
    });
    router.register("/b", |res, _| {
        res.set_status_code(200);
        res.set_body("b");
    });
    router.set_default(|res, req| {
        res.set_status_code(if req.has_errors() { 400 } else { 404 });
    });
    Arc::new(router)
}

fn reactor(transport: ScriptedTransport) -> Multiplexer<ScriptedTransport> {
    Multiplexer::new(transport, echo_router(), 64, 8000).unwrap()
}

#[test]
fn test_listener_watched_from_start() {
    let mux = reactor(ScriptedTransport::default());

    assert_eq!(mux.registry().snapshot(), vec![LISTENER]);
}

#[test]
fn test_accept_drains_pending_connections() {
    let mut mux = reactor(ScriptedTransport::default().round(&[0]).accept(1).accept(2));

    assert_eq!(mux.run_once().unwrap(), 1);
    assert_eq!(mux.registry().snapshot(), vec![Handle(0), Handle(1), Handle(2)]);
    assert_eq!(mux.registry().address_of(Handle(2)), Some(peer(40002)));
}

#[test]
fn test_clients_served_in_ascending_order() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .accept(2)
        .round(&[2, 1])
        .read(1, b"GET /a HTTP/1.1\r\n\r\n")
        .read(2, b"GET /b HTTP/1.1\r\n\r\n");
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    assert_eq!(mux.run_once().unwrap(), 2);

    let t = mux.transport();
    let order: Vec<Handle> = t.sent.iter().map(|(h, _)| *h).collect();
    assert_eq!(order, vec![Handle(1), Handle(2)]);
    assert!(t.sent_text(1).ends_with("\r\n\r\na"));
    assert!(t.sent_text(2).ends_with("\r\n\r\nb"));
    assert_eq!(t.closed, vec![Handle(1), Handle(2)]);
    assert_eq!(t.watched_seen[1], vec![Handle(0), Handle(1), Handle(2)]);
    assert_eq!(mux.registry().snapshot(), vec![LISTENER]);
    assert_eq!(mux.registry().peer_count(), 0);
}

#[test]
fn test_response_written_before_close() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"GET /missing HTTP/1.1\r\nHost: x\r\n\r\n");
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    let t = mux.transport();
    assert!(t.sent_text(1).starts_with("HTTP/1.1 404 Not Found\r\nStatus: 404 Not Found\r\n"));
    assert_eq!(t.closed, vec![Handle(1)]);
}

#[test]
fn test_zero_byte_read_disconnects_without_reply() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"");
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    let t = mux.transport();
    assert!(t.sent.is_empty());
    assert_eq!(t.closed, vec![Handle(1)]);
    assert!(!mux.registry().is_watched(Handle(1)));
}

#[test]
fn test_read_error_disconnects() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read_err(1, io::ErrorKind::ConnectionReset);
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    assert!(mux.transport().sent.is_empty());
    assert_eq!(mux.transport().closed, vec![Handle(1)]);
}

#[test]
fn test_would_block_keeps_handle_watched() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .round(&[1])
        .read_err(1, io::ErrorKind::WouldBlock)
        .read(1, b"GET /a HTTP/1.1\r\n\r\n");
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();
    assert!(mux.registry().is_watched(Handle(1)));
    assert!(mux.transport().closed.is_empty());

    mux.run_once().unwrap();
    assert_eq!(mux.transport().sent.len(), 1);
    assert!(!mux.registry().is_watched(Handle(1)));
}

#[test]
fn test_malformed_request_still_answered() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"no delimiter at all");
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    assert!(mux.transport().sent_text(1).starts_with("HTTP/1.1 400 Bad Request\r\n"));
}

#[test]
fn test_send_failure_still_closes() {
    let mut transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"GET /a HTTP/1.1\r\n\r\n");
    transport.failing_sends.push(Handle(1));
    let mut mux = reactor(transport);

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    assert_eq!(mux.transport().closed, vec![Handle(1)]);
    assert!(!mux.registry().is_watched(Handle(1)));
}

#[test]
fn test_read_truncated_to_buffer_size() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"GET /a HTTP/1.1\r\n\r\nextra body bytes");
    // "GET /a HTTP/1.1\r\n\r\n" is 19 bytes; nothing past it is read
    let mut mux = Multiplexer::new(transport, echo_router(), 64, 19).unwrap();

    mux.run_once().unwrap();
    mux.run_once().unwrap();

    assert!(mux.transport().sent_text(1).ends_with("\r\n\r\na"));
}

#[test]
fn test_accept_failure_skips_only_that_connection() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept_err(io::ErrorKind::ConnectionAborted.into())
        .accept(1)
        .accept_err(io::ErrorKind::ConnectionReset.into())
        .accept(2);
    let mut mux = reactor(transport);

    // a single readiness event must drain the whole backlog
    assert!(mux.run_once().is_ok());
    assert!(mux.registry().is_watched(Handle(1)));
    assert!(mux.registry().is_watched(Handle(2)));
}

#[test]
fn test_resource_accept_failure_retried_next_pass() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept_err(io::Error::other("too many open files"))
        .accept(1)
        // no new listener event arrives
        .round(&[]);
    let mut mux = reactor(transport);

    assert!(mux.run_once().is_ok());
    assert!(!mux.registry().is_watched(Handle(1)));

    mux.run_once().unwrap();
    assert!(mux.registry().is_watched(Handle(1)));

    let t = mux.transport();
    assert_eq!(t.timeouts_seen[0], None);
    assert!(t.timeouts_seen[1].is_some());
}

#[test]
fn test_readiness_failure_is_fatal() {
    let mut transport = ScriptedTransport::default();
    transport.rounds.push_back(Err(io::Error::other("poll broke")));
    let mut mux = reactor(transport);

    assert!(matches!(mux.run_once(), Err(ServerError::Readiness(_))));
}

#[test]
fn test_run_stops_on_readiness_failure() {
    let transport = ScriptedTransport::default()
        .round(&[0])
        .accept(1)
        .round(&[1])
        .read(1, b"GET /a HTTP/1.1\r\n\r\n");
    let mut mux = reactor(transport);

    // the script runs dry after two passes
    assert!(matches!(mux.run(), Err(ServerError::Readiness(_))));
    assert_eq!(mux.transport().sent.len(), 1);
}

#[test]
fn test_capacity_overflow_is_fatal() {
    let transport = ScriptedTransport::default().round(&[0]).accept(1).accept(2);
    let mut mux = Multiplexer::new(transport, echo_router(), 2, 8000).unwrap();

    assert!(matches!(mux.run_once(), Err(ServerError::Capacity(_))));
    assert_eq!(mux.transport().closed, vec![Handle(2)]);
    assert!(mux.registry().is_watched(Handle(1)));
}

#[test]
fn test_unwatched_ready_handle_ignored() {
    let transport = ScriptedTransport::default()
        .round(&[7])
        .read(7, b"GET /a HTTP/1.1\r\n\r\n");
    let mut mux = reactor(transport);

    assert_eq!(mux.run_once().unwrap(), 0);
    assert!(mux.transport().sent.is_empty());
}
