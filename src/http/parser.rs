//! Request parser.
//!
//! The parser is a small state machine driven over one raw buffer:
//!
//! ```text
//! RequestLine ──► Headers ──► Body ──┬─► FormBody ──────┐
//!                                    ├─► MultipartBody ─┼─► Done
//!                                    └──────────────────┘
//! ```
//!
//! Only a missing header/body delimiter aborts parsing. Every other problem
//! is recorded in [`Request::parsing_errors`] and the offending line or part
//! is skipped.

use thiserror::Error;

use crate::http::request::{
    FORM_URLENCODED, MULTIPART_FORM_DATA, Method, Request, header, parse_http_version,
};

const HEADERS_END: &[u8] = b"\r\n\r\n";
const LINE_END: &str = "\r\n";
const HEADER_SEPARATOR: &str = ": ";
const BOUNDARY_PARAM: &str = "boundary=";
const NAME_PARAM: &str = "name=";

/// Parts shorter than this cannot hold a `Content-Disposition` line and are
/// treated as boundary leftovers.
const MIN_PART_LEN: usize = "Content-Disposition".len();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing header/body delimiter")]
    MalformedMessage,
    #[error("invalid Protocol/URL/Version format: {0:?}")]
    InvalidRequestLine(String),
    #[error("{0} is not a valid method")]
    InvalidMethod(String),
    #[error("{0} is not a valid HTTP version")]
    InvalidVersion(String),
    #[error("invalid header format: {0:?}")]
    InvalidHeader(String),
    #[error("invalid Content-Length: {0:?}")]
    InvalidContentLength(String),
    #[error("invalid multipart body: {0}")]
    InvalidMultipart(String),
}

/// Parser position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    RequestLine,
    Headers,
    Body,
    FormBody,
    MultipartBody,
    Done,
}

/// Parses one raw request buffer.
pub fn parse_http_request(buf: &[u8]) -> Result<Request, ParseError> {
    RequestParser::new().parse(buf)
}

#[derive(Debug)]
pub struct RequestParser {
    state: State,
    request: Request,
    /// Raw `Content-Type` value, kept for the multipart boundary
    content_type: Option<String>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: State::RequestLine,
            request: Request::default(),
            content_type: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// Consumes the parser and turns `buf` into a [`Request`].
    ///
    /// Fails only with [`ParseError::MalformedMessage`] when `buf` has no
    /// `\r\n\r\n` delimiter.
    pub fn parse(mut self, buf: &[u8]) -> Result<Request, ParseError> {
        let headers_end = find_headers_end(buf).ok_or(ParseError::MalformedMessage)?;

        let head = String::from_utf8_lossy(&buf[..headers_end]);
        for line in head.split(LINE_END) {
            self.feed_line(line);
        }

        self.state = State::Body;
        self.feed_body(&buf[headers_end + HEADERS_END.len()..]);

        Ok(self.request)
    }

    fn feed_line(&mut self, line: &str) {
        match self.state {
            State::RequestLine => {
                self.parse_request_line(line);
                self.state = State::Headers;
            }
            State::Headers => self.parse_header_line(line),
            _ => {}
        }
    }

    fn parse_request_line(&mut self, line: &str) {
        let parts: Vec<&str> = line.split(' ').collect();
        let [method, url, version] = parts.as_slice() else {
            self.push_error(ParseError::InvalidRequestLine(line.to_string()));
            return;
        };

        match method.parse::<Method>() {
            Ok(method) => self.request.method = Some(method),
            Err(e) => self.push_error(e),
        }

        self.request.url = url.to_string();

        match parse_http_version(version) {
            Some((major, minor)) => {
                self.request.proto = version.to_string();
                self.request.proto_major = major;
                self.request.proto_minor = minor;
            }
            None => self.push_error(ParseError::InvalidVersion(version.to_string())),
        }
    }

    /// `Content-Length`, `Host` and `Content-Type` are recognised in any
    /// case, so `content-length: 5` still frames the body; every other key is
    /// stored exactly as received.
    fn parse_header_line(&mut self, line: &str) {
        let Some((key, value)) = line.split_once(HEADER_SEPARATOR) else {
            self.push_error(ParseError::InvalidHeader(line.to_string()));
            return;
        };

        if key.eq_ignore_ascii_case(header::CONTENT_LENGTH) {
            match value.trim().parse::<u64>() {
                Ok(n) => self.request.content_length = n,
                Err(_) => self.push_error(ParseError::InvalidContentLength(value.to_string())),
            }
            return;
        }

        if key.eq_ignore_ascii_case(header::HOST) {
            self.request.host = value.to_string();
            return;
        }

        if key.eq_ignore_ascii_case(header::CONTENT_TYPE) {
            if value.contains(FORM_URLENCODED) {
                self.request.has_form = true;
            }
            if value.contains(MULTIPART_FORM_DATA) {
                self.request.has_post_form = true;
            }
            self.content_type = Some(value.to_string());
        }

        for piece in value.split(',') {
            self.request.headers.add(key, piece.trim());
        }
    }

    fn feed_body(&mut self, body: &[u8]) {
        self.request.body = body.to_vec();

        // url-encoded wins if a Content-Type ever names both
        self.state = if self.request.has_form {
            State::FormBody
        } else if self.request.has_post_form {
            State::MultipartBody
        } else {
            State::Done
        };

        match self.state {
            State::FormBody => self.parse_form(body),
            State::MultipartBody => self.parse_multipart(body),
            _ => {}
        }

        self.state = State::Done;
    }

    /// `application/x-www-form-urlencoded` body. No percent-decoding.
    fn parse_form(&mut self, body: &[u8]) {
        let body = String::from_utf8_lossy(body);

        for pair in body.split('&') {
            let kv: Vec<&str> = pair.split('=').collect();
            if let [name, value] = kv.as_slice() {
                self.request.form.add(*name, value.replace('+', " "));
            }
        }
    }

    /// `multipart/form-data` body. Split and stored as bytes; only the part
    /// metadata is decoded as text.
    fn parse_multipart(&mut self, body: &[u8]) {
        let Some(boundary) = self.content_type.as_deref().and_then(multipart_boundary) else {
            self.push_error(ParseError::InvalidMultipart("missing boundary".to_string()));
            return;
        };

        let delimiter = format!("--{boundary}");

        for part in split_bytes(body, delimiter.as_bytes()) {
            if part.len() < MIN_PART_LEN {
                continue;
            }

            // strips any run of CR and LF bytes, not a single CRLF
            let part = trim_leading_newlines(part);

            let Some(at) = find_bytes(part, HEADERS_END) else {
                self.push_error(ParseError::InvalidMultipart("part without header/value separator".to_string()));
                continue;
            };
            let meta = String::from_utf8_lossy(&part[..at]);
            let value = &part[at + HEADERS_END.len()..];

            match field_name(&meta) {
                Some(name) => self.request.post_form.add(name, value),
                None => self.push_error(ParseError::InvalidMultipart("part without a field name".to_string())),
            }
        }
    }

    fn push_error(&mut self, err: ParseError) {
        self.request.parsing_errors.push(err);
    }
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    find_bytes(buf, HEADERS_END)
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

/// Splits on every occurrence of `delimiter`, like `str::split`.
fn split_bytes<'a>(mut rest: &'a [u8], delimiter: &[u8]) -> Vec<&'a [u8]> {
    let mut parts = Vec::new();

    while let Some(at) = find_bytes(rest, delimiter) {
        parts.push(&rest[..at]);
        rest = &rest[at + delimiter.len()..];
    }
    parts.push(rest);

    parts
}

fn trim_leading_newlines(mut part: &[u8]) -> &[u8] {
    while let [b'\r' | b'\n', rest @ ..] = part {
        part = rest;
    }
    part
}

/// Boundary token following the last `boundary=` of a `Content-Type` value,
/// with surrounding quotes removed.
pub fn multipart_boundary(content_type: &str) -> Option<&str> {
    let start = content_type.rfind(BOUNDARY_PARAM)? + BOUNDARY_PARAM.len();
    let boundary = content_type[start..].trim().trim_matches('"');

    if boundary.is_empty() { None } else { Some(boundary) }
}

/// Field name from the metadata lines of a multipart part, e.g.
/// `Content-Disposition: form-data; name="text"` gives `text`.
fn field_name(meta: &str) -> Option<String> {
    let cleaned: String = meta
        .replace(LINE_END, " ")
        .chars()
        .filter(|c| !matches!(c, '\r' | ':' | ';' | '"'))
        .collect();

    cleaned
        .split(' ')
        .find_map(|token| token.strip_prefix(NAME_PARAM).filter(|name| !name.is_empty()))
        .map(str::to_string)
}
