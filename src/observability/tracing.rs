//! Distributed trace context pass-through.
//!
//! # Responsibilities
//! - Extract W3C trace headers from incoming requests
//! - Carry them, uninterpreted, in the request context and span
//!
//! # Design Decisions
//! - Values are opaque: no parsing, no validation, no sampling decisions
//! - Handlers that call other services read the context from request
//!   extensions and forward it themselves

use axum::http::HeaderMap;
use serde::Serialize;
use tracing::Span;

pub const TRACEPARENT: &str = "traceparent";
pub const TRACESTATE: &str = "tracestate";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TraceContext {
    pub traceparent: Option<String>,
    pub tracestate: Option<String>,
}

impl TraceContext {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            traceparent: read(TRACEPARENT),
            tracestate: read(TRACESTATE),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.traceparent.is_none() && self.tracestate.is_none()
    }
}

/// Span wrapping one tracked request.
pub fn request_span(request_id: &str, method: &str, path: &str, trace: &TraceContext) -> Span {
    tracing::info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %path,
        traceparent = trace.traceparent.as_deref().unwrap_or(""),
        tracestate = trace.tracestate.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_headers_are_copied_verbatim() {
        let mut headers = HeaderMap::new();
        headers.insert(
            TRACEPARENT,
            HeaderValue::from_static("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01"),
        );
        headers.insert(TRACESTATE, HeaderValue::from_static("vendor=opaque;;"));

        let ctx = TraceContext::from_headers(&headers);
        assert_eq!(
            ctx.traceparent.as_deref(),
            Some("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01")
        );
        assert_eq!(ctx.tracestate.as_deref(), Some("vendor=opaque;;"));
        assert!(!ctx.is_empty());
    }

    #[test]
    fn test_missing_headers() {
        assert!(TraceContext::from_headers(&HeaderMap::new()).is_empty());
    }
}
