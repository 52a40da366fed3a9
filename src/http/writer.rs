use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::http::request::header;
use crate::http::response::ResponseBuilder;

/// Serializes a response to wire format.
///
/// Layout:
///
/// ```text
/// HTTP/<version> <code> <reason>\r\n
/// Status: <code> <reason>\r\n
/// <name>: <value>\r\n           (one per header, insertion order)
/// Content-Length: <len(body)>\r\n
/// \r\n
/// <body>
/// ```
///
/// `Content-Length` is always computed from the body, even when a handler
/// set a header of the same name.
pub fn serialize_response(resp: &ResponseBuilder) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body().len());
    let status = resp.status();

    // Status line
    buf.extend_from_slice(format!("HTTP/{} {}\r\n", resp.version(), status).as_bytes());
    buf.extend_from_slice(format!("Status: {}\r\n", status).as_bytes());

    // Headers
    for (k, v) in resp.headers() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    buf.extend_from_slice(format!("{}: {}\r\n", header::CONTENT_LENGTH, resp.body().len()).as_bytes());

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    buf.extend_from_slice(resp.body());

    buf
}

/// A serialized response plus how much of it has reached the peer.
#[derive(Debug)]
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &ResponseBuilder) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn remaining(&self) -> &[u8] {
        &self.buffer[self.written..]
    }

    pub fn is_done(&self) -> bool {
        self.written >= self.buffer.len()
    }

    pub async fn write_to_stream(
        &mut self,
        stream: &mut TcpStream,
    ) -> anyhow::Result<()> {
        while !self.is_done() {
            let n = stream
                .write(&self.buffer[self.written..])
                .await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }

        stream.flush().await?;
        Ok(())
    }
}
