//! HTTP message engine.
//!
//! A deliberately small HTTP/1.1 subset: one request per connection, a
//! single read per request, `Content-Length` framing only, url-encoded and
//! multipart form bodies.
//!
//! # Architecture
//!
//! - **`parser`**: bytes → [`Request`](request::Request), as an explicit state machine
//! - **`request`**: request data, methods, version parsing, request serialization
//! - **`values`**: the ordered multimap used for headers and forms
//! - **`response`**: the response builder handlers write into, reason phrases
//! - **`writer`**: response serialization and the async stream writer
//! - **`connection`**: the parse → dispatch cycle and the per-task connection
//!
//! # Request/response cycle
//!
//! ```text
//!   raw bytes ──► parser ──► Request ──► Router::dispatch(url)
//!                                              │
//!                                              ▼
//!   wire bytes ◄── writer ◄── ResponseBuilder ◄── handler
//! ```
//!
//! # Example
//!
//! ```
//! use rawserve::http::connection::process;
//! use rawserve::router::Router;
//!
//! let mut router = Router::new();
//! router.register("/", |res, _req| {
//!     res.set_status_code(200);
//!     res.set_body("hi");
//! });
//!
//! let res = process(&router, b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n");
//! assert_eq!(res.status_code(), 200);
//! assert_eq!(res.body(), b"hi");
//! ```

pub mod connection;
pub mod parser;
pub mod request;
pub mod response;
pub mod values;
pub mod writer;
