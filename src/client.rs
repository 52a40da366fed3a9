//! Outbound HTTP client.
//!
//! The mirror image of the server: serialize a [`Request`], send it over a
//! fresh TCP connection, and read back one `Content-Length` framed response.
//! One request per connection, like the server.

use std::time::Duration;

use anyhow::{Context, Result};
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::http::request::{Method, Request, RequestBuilder, header};
use crate::http::values::Values;

/// Default buffer size for reads
const BUFFER_SIZE: usize = 8192;

/// Responses whose headers exceed this are rejected
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// A response read back from a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientResponse {
    /// Version token of the status line, e.g. "HTTP/1.1"
    pub version: String,
    pub status_code: u16,
    pub reason: String,
    pub headers: Values,
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.first(name)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    /// Connection timeout duration
    connection_timeout: Duration,

    /// Request timeout duration
    request_timeout: Duration,
}

impl Default for Client {
    fn default() -> Self {
        Self::new(Duration::from_secs(5), Duration::from_secs(30))
    }
}

impl Client {
    pub fn new(connection_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connection_timeout,
            request_timeout,
        }
    }

    /// Builds a request for an absolute URL such as
    /// `http://localhost:8080/form?x=1`.
    ///
    /// An empty method means GET. `Host` comes from the URL authority and the
    /// request target from its path and query.
    pub fn new_request(method: &str, url: &str, body: impl Into<Vec<u8>>) -> Result<Request> {
        let method = if method.is_empty() {
            Method::GET
        } else {
            method.parse::<Method>()?
        };

        let url = url::Url::parse(url).context("Invalid request URL")?;
        let host = url.host_str().context("Request URL missing host")?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };

        let target = match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        };

        Ok(RequestBuilder::new()
            .method(method)
            .url(target)
            .host(host)
            .body(body)
            .build())
    }

    /// Sends `request` to the server named by its `Host` (port 80 if none)
    /// and reads the response.
    pub async fn send(&self, request: &Request) -> Result<ClientResponse> {
        let addr = if request.host.contains(':') {
            request.host.clone()
        } else {
            format!("{}:80", request.host)
        };

        let stream = timeout(self.connection_timeout, TcpStream::connect(&addr))
            .await
            .context("Connection timeout")?
            .with_context(|| format!("Failed to connect to {}", addr))?;

        tracing::trace!(%addr, "Connected");

        timeout(
            self.request_timeout,
            self.send_request_and_receive_response(stream, request),
        )
        .await
        .context("Request timeout")?
    }

    async fn send_request_and_receive_response(
        &self,
        mut stream: TcpStream,
        request: &Request,
    ) -> Result<ClientResponse> {
        stream.write_all(&request.to_bytes()).await?;
        stream.flush().await?;

        tracing::trace!("Request sent");

        self.read_http_response(&mut stream).await
    }

    async fn read_http_response(&self, stream: &mut TcpStream) -> Result<ClientResponse> {
        let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

        loop {
            let n = stream.read_buf(&mut buffer).await?;

            if n == 0 {
                anyhow::bail!("Connection closed before complete response received");
            }

            if let Some(headers_end) = buffer
                .windows(4)
                .position(|window| window == b"\r\n\r\n")
            {
                let head = buffer.split_to(headers_end + 4);
                let mut response = parse_response_head(&head)?;
                response.body = read_response_body(stream, &mut buffer, &response.headers).await?;
                return Ok(response);
            }

            if buffer.len() > MAX_HEADER_BYTES {
                anyhow::bail!("Response headers too large");
            }
        }
    }
}

/// Parses a status line and headers. The body is left empty.
pub fn parse_response_head(head: &[u8]) -> Result<ClientResponse> {
    let head = std::str::from_utf8(head).context("Invalid UTF-8 in response headers")?;
    let mut lines = head.split("\r\n");

    let status_line = lines.next().context("Empty response")?;
    let parts: Vec<&str> = status_line.splitn(3, ' ').collect();

    if parts.len() < 2 {
        anyhow::bail!("Invalid status line: {}", status_line);
    }

    let status_code: u16 = parts[1].parse().context("Invalid status code")?;

    let mut headers: Values = Values::new();
    for line in lines {
        if line.is_empty() {
            break;
        }

        if let Some((key, value)) = line.split_once(':') {
            headers.add(key.trim(), value.trim());
        }
    }

    Ok(ClientResponse {
        version: parts[0].to_string(),
        status_code,
        reason: parts.get(2).copied().unwrap_or_default().to_string(),
        headers,
        body: Vec::new(),
    })
}

/// Reads the body: exactly `Content-Length` bytes, or until the peer closes
/// when the header is missing. With several `Content-Length` lines the last
/// one wins; the server appends the computed length after handler headers.
async fn read_response_body(stream: &mut TcpStream, buffer: &mut BytesMut, headers: &Values) -> Result<Vec<u8>> {
    let Some(content_length) = headers
        .last(header::CONTENT_LENGTH)
        .and_then(|v| v.parse::<usize>().ok())
    else {
        while stream.read_buf(buffer).await? != 0 {}
        return Ok(buffer.split().to_vec());
    };

    let mut body = Vec::with_capacity(content_length);

    // bytes already read past the headers
    let from_buffer = buffer.len().min(content_length);
    body.extend_from_slice(&buffer[..from_buffer]);
    buffer.advance(from_buffer);

    let mut chunk = [0u8; BUFFER_SIZE];
    while body.len() < content_length {
        let to_read = (content_length - body.len()).min(BUFFER_SIZE);
        let n = stream.read(&mut chunk[..to_read]).await?;

        if n == 0 {
            anyhow::bail!("Connection closed before complete body received");
        }

        body.extend_from_slice(&chunk[..n]);
    }

    Ok(body)
}
