use std::time::Duration;

use apikey_core_types::{normalize_path, PathError};
use axum::http::{HeaderMap, Method};
use tokio::time::Instant;
use tracing::{field, info_span, Span};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
/// Span tag value for a key that could not be resolved.
pub const UNKNOWN_TAG: &str = "unknown";

/// The parts of an intercepted request the plugin reads.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
}

impl InboundRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    /// Decoded, dot-segment-free form of `path`. Always derived from the raw
    /// path so escapes are decoded exactly once.
    pub fn normalized_path(&self) -> Result<String, PathError> {
        normalize_path(&self.path)
    }
}

/// Per-request state shared between the host and the plugin.
#[derive(Debug)]
pub struct RequestContext {
    pub trace_id: String,
    pub deadline: Option<Instant>,
    span: Span,
}

impl RequestContext {
    /// Context with a fresh trace id and a deadline `timeout` from now.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self::with_trace_id(Uuid::new_v4().to_string(), timeout)
    }

    /// Reuses the caller's `x-request-id` when one is present.
    pub fn for_request(request: &InboundRequest, timeout: Option<Duration>) -> Self {
        let inbound = request
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());
        match inbound {
            Some(trace_id) => Self::with_trace_id(trace_id.to_string(), timeout),
            None => Self::new(timeout),
        }
    }

    fn with_trace_id(trace_id: String, timeout: Option<Duration>) -> Self {
        let span = info_span!(
            "apikey.request",
            trace_id = %trace_id,
            api_key_name = field::Empty,
            api_key_namespace = field::Empty,
            api_binding_name = field::Empty,
            api_binding_namespace = field::Empty,
        );
        Self {
            trace_id,
            deadline: timeout.map(|timeout| Instant::now() + timeout),
            span,
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn record_key(&self, name: &str, namespace: &str) {
        self.span.record("api_key_name", name);
        self.span.record("api_key_namespace", namespace);
    }

    pub fn record_binding(&self, name: &str, namespace: &str) {
        self.span.record("api_binding_name", name);
        self.span.record("api_binding_namespace", namespace);
    }
}
