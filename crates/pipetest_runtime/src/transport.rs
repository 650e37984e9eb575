//! The HTTP transport capability.
//!
//! The evaluator never opens sockets: it hands a finalized
//! [`HttpRequest`] to an injected [`HttpTransport`] and consumes the
//! [`HttpResponse`]. The CLI supplies a live transport; tests use
//! [`MockTransport`], which scripts responses by method and path and
//! records every request it observed.
//!
//! A [`CancelToken`] is threaded into every dispatch; a fired token must
//! surface as a transport error, which the evaluator renders as
//! `E_RUNTIME_TRANSPORT`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// A finalized outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Per-request deadline in milliseconds; `None` means no deadline.
    pub timeout_millis: Option<f64>,
}

impl HttpRequest {
    /// First header value with the given name, case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The path-and-query portion of the URL.
    pub fn path(&self) -> &str {
        let after_scheme = match self.url.find("://") {
            Some(idx) => &self.url[idx + 3..],
            None => return &self.url,
        };
        match after_scheme.find('/') {
            Some(idx) => &after_scheme[idx..],
            None => "/",
        }
    }
}

/// A raw response from the transport.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    /// Multi-value headers, e.g. repeated `Set-Cookie`.
    pub headers: Vec<(String, Vec<String>)>,
    pub body: Vec<u8>,
}

/// Opaque transport failure; rendered into `E_RUNTIME_TRANSPORT`.
#[derive(Debug, Clone)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for TransportError {}

/// Cooperative cancellation shared between the driver and transports.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    fired: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.fired.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// The dispatch capability. Implementations must be safe for sequential
/// use; thread safety is not required by the evaluator.
pub trait HttpTransport {
    fn dispatch(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse, TransportError>;
}

// ----------------------------------------------------------------------
// Mock transport
// ----------------------------------------------------------------------

struct Route {
    method: String,
    path: String,
    status: u16,
    headers: Vec<(String, Vec<String>)>,
    body: Vec<u8>,
}

/// Scripted transport for tests.
///
/// Routes match on method plus the URL's path (query string excluded).
/// Every dispatched request is recorded in order and can be inspected
/// with [`MockTransport::requests`]. Dispatching a request with no
/// matching route returns a transport error, which conveniently doubles
/// as an "unreachable endpoint" stub.
#[derive(Default)]
pub struct MockTransport {
    routes: Vec<Route>,
    recorded: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts a JSON response for `method path`.
    pub fn route(mut self, method: &str, path: &str, status: u16, body: &serde_json::Value) -> Self {
        self.routes.push(Route {
            method: method.to_string(),
            path: path.to_string(),
            status,
            headers: vec![(
                "Content-Type".to_string(),
                vec!["application/json".to_string()],
            )],
            body: serde_json::to_vec(body).unwrap_or_default(),
        });
        self
    }

    /// Scripts a response with raw bytes and explicit headers.
    pub fn route_raw(
        mut self,
        method: &str,
        path: &str,
        status: u16,
        headers: Vec<(String, Vec<String>)>,
        body: Vec<u8>,
    ) -> Self {
        self.routes.push(Route {
            method: method.to_string(),
            path: path.to_string(),
            status,
            headers,
            body,
        });
        self
    }

    /// Every request dispatched so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.recorded.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl HttpTransport for MockTransport {
    fn dispatch(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError("cancelled".to_string()));
        }
        if let Ok(mut recorded) = self.recorded.lock() {
            recorded.push(request.clone());
        }

        let path = request.path();
        let bare_path = path.split('?').next().unwrap_or(path);
        for route in &self.routes {
            if route.method == request.method && route.path == bare_path {
                return Ok(HttpResponse {
                    status: route.status,
                    headers: route.headers.clone(),
                    body: route.body.clone(),
                });
            }
        }
        Err(TransportError(format!(
            "no route for {} {}",
            request.method, bare_path
        )))
    }
}
