/// Returns the standard reason phrase for a status code.
///
/// Unknown codes map to an empty phrase, so the status line of a response
/// whose handler never set a status reads `HTTP/1.1 0 `.
///
/// # Example
///
/// ```
/// # use rawserve::http::response::reason_phrase;
/// assert_eq!(reason_phrase(200), "OK");
/// assert_eq!(reason_phrase(404), "Not Found");
/// assert_eq!(reason_phrase(799), "");
/// ```
pub fn reason_phrase(code: u16) -> &'static str {
    match code {
        100 => "Continue",
        101 => "Switching Protocols",
        102 => "Processing",
        103 => "Early Hints",

        200 => "OK",
        201 => "Created",
        202 => "Accepted",
        203 => "Non-Authoritative Information",
        204 => "No Content",
        205 => "Reset Content",
        206 => "Partial Content",
        207 => "Multi-Status",
        208 => "Already Reported",
        226 => "IM Used",

        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        305 => "Use Proxy",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",

        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Request Entity Too Large",
        414 => "Request URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Requested Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",

        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",

        _ => "",
    }
}

/// Response state a handler writes into.
///
/// One builder exists per connection and only the handler of that
/// connection touches it. Headers ("entities") keep insertion order; setting
/// a name twice replaces the earlier value in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseBuilder {
    version: String,
    status_code: u16,
    entities: Vec<(String, String)>,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates an empty builder: no version, status 0, no headers, no body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the protocol version written after `HTTP/`, e.g. `"1.1"`.
    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    pub fn set_status_code(&mut self, code: u16) {
        self.status_code = code;
    }

    /// Adds or replaces a header.
    ///
    /// # Example
    ///
    /// ```
    /// # use rawserve::http::response::ResponseBuilder;
    /// let mut res = ResponseBuilder::new();
    /// res.set_header("Content-Type", "text/plain");
    /// res.set_header("Content-Type", "text/html");
    /// assert_eq!(res.header("Content-Type"), Some("text/html"));
    /// ```
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();

        match self.entities.iter_mut().find(|(k, _)| *k == name) {
            Some((_, v)) => *v = value,
            None => self.entities.push((name, value)),
        }
    }

    pub fn set_body(&mut self, content: impl Into<Vec<u8>>) {
        self.body = content.into();
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Status code followed by its reason phrase, e.g. `"200 OK"`.
    pub fn status(&self) -> String {
        format!("{} {}", self.status_code, reason_phrase(self.status_code))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.entities
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn headers(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entities
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}
