use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use regex::Regex;

/// Everything a handler may look at, detached from the HTTP server.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    /// Path plus optional query string, as received.
    pub uri: String,
    pub headers: HeaderMap,
    /// Raw body bytes; decoding is left to the handler.
    pub body: Bytes,
}

impl Request {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// The URI with any query string removed.
    pub fn path(&self) -> &str {
        self.uri.split('?').next().unwrap_or_default()
    }

    pub fn accept(&self) -> Option<&str> {
        self.headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
    }
}

/// Status, optional content type and body produced for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub content_type: Option<&'static str>,
    pub body: String,
}

impl Reply {
    pub fn new(status: StatusCode, content_type: &'static str, body: String) -> Self {
        Self {
            status,
            content_type: Some(content_type),
            body,
        }
    }

    /// Unrouted requests get a bare 404.
    pub fn not_found() -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            content_type: None,
            body: String::new(),
        }
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.body).into_response();
        let headers = response.headers_mut();
        match self.content_type {
            Some(ct) => {
                headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(ct));
            }
            None => {
                headers.remove(header::CONTENT_TYPE);
            }
        }
        response
    }
}

pub type Handler<C> = fn(&C, &Request) -> Reply;

struct Route<C> {
    pattern: Regex,
    handler: Handler<C>,
}

/// Method + path-regex dispatch table over a shared context `C`.
///
/// When several patterns of one method match, the one registered last wins.
pub struct Router<C> {
    routes: Vec<(Method, Vec<Route<C>>)>,
}

impl<C> Default for Router<C> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<C> Router<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to `pattern` for `method`. Re-adding an identical pattern
    /// replaces the earlier handler without changing its position.
    pub fn add_route(&mut self, pattern: &str, method: Method, handler: Handler<C>) -> Result<()> {
        let regex = Regex::new(pattern).with_context(|| format!("invalid route pattern {pattern}"))?;

        let idx = match self.routes.iter().position(|(m, _)| *m == method) {
            Some(idx) => idx,
            None => {
                self.routes.push((method, Vec::new()));
                self.routes.len() - 1
            }
        };
        let routes = &mut self.routes[idx].1;

        match routes.iter_mut().find(|r| r.pattern.as_str() == pattern) {
            Some(existing) => existing.handler = handler,
            None => routes.push(Route {
                pattern: regex,
                handler,
            }),
        }
        Ok(())
    }

    fn resolve(&self, method: &Method, path: &str) -> Option<Handler<C>> {
        let (_, routes) = self.routes.iter().find(|(m, _)| m == method)?;
        routes
            .iter()
            .filter(|r| r.pattern.is_match(path))
            .last()
            .map(|r| r.handler)
    }

    pub fn process(&self, ctx: &C, request: &Request) -> Reply {
        match self.resolve(&request.method, request.path()) {
            Some(handler) => handler(ctx, request),
            None => Reply::not_found(),
        }
    }
}
