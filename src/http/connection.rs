use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use crate::http::parser::parse_http_request;
use crate::http::request::Request;
use crate::http::response::ResponseBuilder;
use crate::http::writer::ResponseWriter;
use crate::router::Router;

/// Version the server answers with.
pub const SERVER_HTTP_VERSION: &str = "1.1";

/// Runs one parse → dispatch cycle over a raw request buffer.
///
/// Always yields a response. A buffer without a header/body delimiter becomes
/// an empty request carrying [`ParseError::MalformedMessage`], which the
/// router sends to the default handler.
///
/// [`ParseError::MalformedMessage`]: crate::http::parser::ParseError::MalformedMessage
pub fn process(router: &Router, raw: &[u8]) -> ResponseBuilder {
    let request = match parse_http_request(raw) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, len = raw.len(), "Unparsable request");
            Request {
                parsing_errors: vec![e],
                ..Request::default()
            }
        }
    };

    let mut response = ResponseBuilder::new();
    response.set_version(SERVER_HTTP_VERSION);

    let handler = router.dispatch(&request.url);
    handler(&mut response, &request);

    debug!(
        method = request.method_str(),
        url = %request.url,
        errors = request.parsing_errors.len(),
        status = response.status_code(),
        "Request handled"
    );

    response
}

/// One accepted connection served by its own task.
///
/// ```text
/// Reading ──► Processing ──► Writing ──► Closed
///    │                                     ▲
///    └──────── peer closed / error ────────┘
/// ```
///
/// The request is read with a single `read`; the connection is closed after
/// the response is written.
pub struct Connection {
    stream: TcpStream,
    peer: SocketAddr,
    router: Arc<Router>,
    read_buffer_size: usize,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(Vec<u8>),
    Writing(ResponseWriter),
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, router: Arc<Router>, read_buffer_size: usize) -> Self {
        Self {
            stream,
            peer,
            router,
            read_buffer_size,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match &mut self.state {
                ConnectionState::Reading => {
                    self.state = match self.read_request().await? {
                        Some(raw) => ConnectionState::Processing(raw),
                        None => {
                            debug!(peer = %self.peer, "Peer closed before sending a request");
                            ConnectionState::Closed
                        }
                    };
                }

                ConnectionState::Processing(raw) => {
                    let response = process(&self.router, raw);
                    self.state = ConnectionState::Writing(ResponseWriter::new(&response));
                }

                ConnectionState::Writing(writer) => {
                    writer.write_to_stream(&mut self.stream).await?;
                    self.state = ConnectionState::Closed;
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        // no keep-alive: every cycle ends here
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }

        Ok(())
    }

    /// Reads once into a fixed-size buffer. `None` means the peer closed.
    pub async fn read_request(&mut self) -> anyhow::Result<Option<Vec<u8>>> {
        let mut buf = vec![0u8; self.read_buffer_size];
        let n = self.stream.read(&mut buf).await?;

        if n == 0 {
            return Ok(None);
        }

        buf.truncate(n);
        Ok(Some(buf))
    }
}
