//! Exact-match request routing.
//!
//! The full raw request target is the lookup key: `/path?x=1` does not match
//! a route registered as `/path`. Unmatched targets go to the default
//! handler, which starts out as a no-op.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::http::request::Request;
use crate::http::response::ResponseBuilder;

/// Application callback invoked once per request.
///
/// The handler reads the parsed request and writes status, headers and body
/// into the response builder. The response is sent after it returns.
pub type Handler = Arc<dyn Fn(&mut ResponseBuilder, &Request) + Send + Sync>;

fn noop(_res: &mut ResponseBuilder, _req: &Request) {}

#[derive(Clone)]
pub struct Route {
    pub url_pattern: String,
    pub handler: Handler,
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("url_pattern", &self.url_pattern)
            .finish_non_exhaustive()
    }
}

/// Built once at startup and only read while serving.
#[derive(Clone)]
pub struct Router {
    routes: HashMap<String, Route>,
    default_handler: Handler,
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routes", &self.routes.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            default_handler: Arc::new(noop),
        }
    }

    /// Registers `handler` for the exact target `path`. A later registration
    /// for the same path replaces the earlier one.
    pub fn register<F>(&mut self, path: impl Into<String>, handler: F)
    where
        F: Fn(&mut ResponseBuilder, &Request) + Send + Sync + 'static,
    {
        let path = path.into();
        let route = Route {
            url_pattern: path.clone(),
            handler: Arc::new(handler),
        };

        if self.routes.insert(path, route).is_some() {
            tracing::debug!("Route handler replaced");
        }
    }

    /// Replaces the handler used when no route matches.
    pub fn set_default<F>(&mut self, handler: F)
    where
        F: Fn(&mut ResponseBuilder, &Request) + Send + Sync + 'static,
    {
        self.default_handler = Arc::new(handler);
    }

    /// Resolves the handler for a raw request target.
    pub fn dispatch(&self, path: &str) -> &Handler {
        self.routes
            .get(path)
            .map(|route| &route.handler)
            .unwrap_or(&self.default_handler)
    }

    pub fn route(&self, path: &str) -> Option<&Route> {
        self.routes.get(path)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
