use std::fmt;
use std::str::FromStr;

use crate::http::parser::ParseError;
use crate::http::values::{FormData, Values};

/// Header names the parser treats specially.
pub mod header {
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const HOST: &str = "Host";
}

/// Media types recognised in `Content-Type` (substring match).
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// Largest accepted major/minor number in an `HTTP/<major>.<minor>` token.
const MAX_VERSION_NUMBER: u32 = 1_000_000;

/// HTTP request methods.
///
/// Only the eight methods of RFC 7231 section 4 are recognised. Matching is
/// case-sensitive: `get` is not a method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// GET - Retrieve a resource
    GET,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// POST - Submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// TRACE - Loop-back test
    TRACE,
    /// CONNECT - Establish a tunnel
    CONNECT,
}

impl Method {
    /// Returns the wire token for this method.
    ///
    /// # Example
    ///
    /// ```
    /// # use rawserve::http::request::Method;
    /// assert_eq!(Method::GET.as_str(), "GET");
    /// assert_eq!(Method::CONNECT.as_str(), "CONNECT");
    /// ```
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::OPTIONS => "OPTIONS",
            Method::GET => "GET",
            Method::HEAD => "HEAD",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::TRACE => "TRACE",
            Method::CONNECT => "CONNECT",
        }
    }
}

impl FromStr for Method {
    type Err = ParseError;

    /// Parses an HTTP method token.
    ///
    /// # Example
    ///
    /// ```
    /// # use rawserve::http::request::Method;
    /// assert_eq!("GET".parse::<Method>().ok(), Some(Method::GET));
    /// assert!("get".parse::<Method>().is_err());
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPTIONS" => Ok(Method::OPTIONS),
            "GET" => Ok(Method::GET),
            "HEAD" => Ok(Method::HEAD),
            "POST" => Ok(Method::POST),
            "PUT" => Ok(Method::PUT),
            "DELETE" => Ok(Method::DELETE),
            "TRACE" => Ok(Method::TRACE),
            "CONNECT" => Ok(Method::CONNECT),
            other => Err(ParseError::InvalidMethod(other.to_string())),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses an `HTTP/<major>.<minor>` version token.
///
/// `HTTP/1.1` and `HTTP/1.0` take a fast path. Otherwise both numbers must be
/// non-negative integers no larger than 1,000,000.
///
/// # Example
///
/// ```
/// # use rawserve::http::request::parse_http_version;
/// assert_eq!(parse_http_version("HTTP/1.0"), Some((1, 0)));
/// assert_eq!(parse_http_version("HTTP/2.7"), Some((2, 7)));
/// assert_eq!(parse_http_version("HTTP/1"), None);
/// ```
pub fn parse_http_version(value: &str) -> Option<(u32, u32)> {
    match value {
        "HTTP/1.1" => return Some((1, 1)),
        "HTTP/1.0" => return Some((1, 0)),
        _ => {}
    }

    let numbers = value.strip_prefix("HTTP/")?;
    let (major, minor) = numbers.split_once('.')?;

    let major: u32 = major.parse().ok()?;
    let minor: u32 = minor.parse().ok()?;

    if major > MAX_VERSION_NUMBER || minor > MAX_VERSION_NUMBER {
        return None;
    }

    Some((major, minor))
}

/// Represents a parsed HTTP request from a client.
///
/// A request is immutable once the parser hands it out. Fields that could not
/// be parsed keep their defaults (`None`, empty, zero) and the reason is
/// recorded in `parsing_errors`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    /// The HTTP method, `None` when the token was missing or unknown
    pub method: Option<Method>,
    /// Raw request target including any query string
    pub url: String,
    /// Version token as received, kept only when valid (e.g. "HTTP/1.1")
    pub proto: String,
    pub proto_major: u32,
    pub proto_minor: u32,
    /// Headers other than `Host` and `Content-Length`, comma-split and trimmed
    pub headers: Values,
    pub host: String,
    pub content_length: u64,
    /// Everything after the header/body delimiter
    pub body: Vec<u8>,
    /// Fields of an `application/x-www-form-urlencoded` body
    pub form: Values,
    pub has_form: bool,
    /// Fields of a `multipart/form-data` body, values as raw bytes
    pub post_form: FormData,
    pub has_post_form: bool,
    /// Non-fatal problems met while parsing
    pub parsing_errors: Vec<ParseError>,
}

impl Request {
    /// Retrieves the first value of a header.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.first(key)
    }

    /// Name of the request method, empty when it was not recognised.
    pub fn method_str(&self) -> &str {
        self.method.map(|m| m.as_str()).unwrap_or("")
    }

    pub fn has_errors(&self) -> bool {
        !self.parsing_errors.is_empty()
    }

    /// Serializes the request to wire format.
    ///
    /// `Content-Length` is always derived from the body; header values stored
    /// under one name are joined with `", "`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128 + self.body.len());

        let proto = if self.proto.is_empty() { "HTTP/1.1" } else { &self.proto };
        let url = if self.url.is_empty() { "/" } else { &self.url };

        buf.extend_from_slice(format!("{} {} {}\r\n", self.method_str(), url, proto).as_bytes());

        if !self.host.is_empty() {
            buf.extend_from_slice(format!("{}: {}\r\n", header::HOST, self.host).as_bytes());
        }

        for (key, values) in self.headers.iter() {
            if key.eq_ignore_ascii_case(header::CONTENT_LENGTH) || key.eq_ignore_ascii_case(header::HOST) {
                continue;
            }
            buf.extend_from_slice(format!("{}: {}\r\n", key, values.join(", ")).as_bytes());
        }

        buf.extend_from_slice(format!("{}: {}\r\n\r\n", header::CONTENT_LENGTH, self.body.len()).as_bytes());
        buf.extend_from_slice(&self.body);

        buf
    }
}

/// Builder for constructing outbound Request objects.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    method: Option<Method>,
    url: Option<String>,
    host: String,
    headers: Values,
    body: Vec<u8>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.add(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Builds the request. The method defaults to GET and the url to "/".
    pub fn build(self) -> Request {
        Request {
            method: Some(self.method.unwrap_or(Method::GET)),
            url: self.url.unwrap_or_else(|| "/".to_string()),
            proto: "HTTP/1.1".to_string(),
            proto_major: 1,
            proto_minor: 1,
            headers: self.headers,
            host: self.host,
            content_length: self.body.len() as u64,
            body: self.body,
            ..Request::default()
        }
    }
}
