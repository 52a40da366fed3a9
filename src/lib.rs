//! rawserve - HTTP/1.1 server on raw sockets
//!
//! Core library: message engine, router and the two serving loops.

pub mod client;
pub mod config;
pub mod http;
pub mod router;
pub mod server;
