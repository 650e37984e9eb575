//! Live HTTP transport backed by `ureq`.
//!
//! Error statuses (4xx/5xx) are responses, not transport errors — the
//! DSL asserts on them. Only connection-level failures and a fired
//! cancel token surface as [`TransportError`].

use std::io::Read;
use std::time::Duration;

use pipetest_runtime::{CancelToken, HttpRequest, HttpResponse, HttpTransport, TransportError};

/// Caps response bodies; an API test endpoint returning more than this
/// is almost certainly a mistake.
const MAX_BODY_BYTES: u64 = 16 * 1024 * 1024;

pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        UreqTransport {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport for UreqTransport {
    fn dispatch(
        &self,
        request: &HttpRequest,
        cancel: &CancelToken,
    ) -> Result<HttpResponse, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError("cancelled".to_string()));
        }

        let mut call = self.agent.request(&request.method, &request.url);
        if let Some(millis) = request.timeout_millis {
            call = call.timeout(Duration::from_millis(millis.max(0.0) as u64));
        }
        for (name, value) in &request.headers {
            call = call.set(name, value);
        }

        let outcome = match &request.body {
            Some(body) => call.send_bytes(body),
            None => call.call(),
        };

        let response = match outcome {
            Ok(response) => response,
            // HTTP error statuses still carry a response.
            Err(ureq::Error::Status(_, response)) => response,
            Err(err) => return Err(TransportError(err.to_string())),
        };

        let status = response.status();
        let headers: Vec<(String, Vec<String>)> = response
            .headers_names()
            .into_iter()
            .map(|name| {
                let values = response
                    .all(&name)
                    .into_iter()
                    .map(|v| v.to_string())
                    .collect();
                (name, values)
            })
            .collect();

        let mut body = Vec::new();
        response
            .into_reader()
            .take(MAX_BODY_BYTES)
            .read_to_end(&mut body)
            .map_err(|e| TransportError(format!("reading response body: {}", e)))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
