//! Request correlation and tracking.
//!
//! # Responsibilities
//! - Reuse the inbound correlation id or mint a UUID v4
//! - Capture method, path, query, client and trace headers per request
//! - Time the request and report the outcome to the metrics monitor
//!
//! # Design Decisions
//! - Request ID assigned as early as possible so every log line carries it
//! - Completion is reported through a drop guard, so cancelled requests are
//!   still counted exactly once
//! - Contexts live in a bounded map; the oldest is evicted silently

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::Query,
    http::{HeaderMap, Request},
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::observability::metrics;
use crate::observability::monitor::{MetricsMonitor, RequestSample};
use crate::observability::tracing::TraceContext;

/// Correlation header, read from requests and echoed on every response.
pub const X_REQUEST_ID: &str = "x-request-id";

/// Status recorded when a request is dropped before producing a response.
pub const STATUS_CLIENT_CLOSED: u16 = 499;

/// Correlation id attached to request extensions for handlers.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(pub String);

impl RequestId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reuse the inbound correlation id verbatim, or mint a fresh one.
pub fn resolve_request_id(headers: &HeaderMap) -> String {
    headers
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// Everything known about one request.
#[derive(Debug, Clone, Serialize)]
pub struct RequestContext {
    pub request_id: String,
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub client_addr: String,
    pub trace: TraceContext,
    pub started_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub duration_ms: Option<f64>,
    #[serde(skip)]
    started: Instant,
}

impl RequestContext {
    pub fn is_finished(&self) -> bool {
        self.status_code.is_some()
    }
}

/// Bounded store of request contexts, reporting completions to the monitor.
pub struct RequestTracker {
    contexts: DashMap<String, RequestContext>,
    /// Insertion order for eviction; entries may be stale if an id was reused.
    order: Mutex<VecDeque<(String, Instant)>>,
    capacity: usize,
    monitor: Arc<MetricsMonitor>,
}

impl RequestTracker {
    pub fn new(capacity: usize, monitor: Arc<MetricsMonitor>) -> Self {
        Self {
            contexts: DashMap::new(),
            order: Mutex::new(VecDeque::with_capacity(capacity + 1)),
            capacity: capacity.max(1),
            monitor,
        }
    }

    /// Start tracking `request`. Completion is reported when the returned
    /// guard is finished or dropped.
    pub fn begin<B>(self: &Arc<Self>, request: &Request<B>, client_addr: &str) -> RequestGuard {
        let query = Query::<BTreeMap<String, String>>::try_from_uri(request.uri())
            .map(|Query(q)| q)
            .unwrap_or_default();

        let context = RequestContext {
            request_id: resolve_request_id(request.headers()),
            method: request.method().to_string(),
            path: request.uri().path().to_string(),
            query,
            client_addr: client_addr.to_string(),
            trace: TraceContext::from_headers(request.headers()),
            started_at: Utc::now(),
            status_code: None,
            duration_ms: None,
            started: Instant::now(),
        };

        self.insert(context.clone());

        RequestGuard {
            tracker: Arc::clone(self),
            context,
            finished: false,
        }
    }

    fn insert(&self, context: RequestContext) {
        let id = context.request_id.clone();
        let started = context.started;
        self.contexts.insert(id.clone(), context);

        let mut order = self.order.lock();
        order.push_back((id, started));
        while self.contexts.len() > self.capacity {
            let Some((oldest, started)) = order.pop_front() else {
                break;
            };
            // Skip ids whose context was since replaced by a newer request.
            self.contexts.remove_if(&oldest, |_, ctx| ctx.started == started);
        }
        // Compact stale order entries so the queue stays bounded.
        if order.len() > self.capacity * 2 {
            order.retain(|(id, started)| {
                self.contexts
                    .get(id)
                    .is_some_and(|ctx| ctx.started == *started)
            });
        }
        drop(order);

        metrics::record_tracked_requests(self.contexts.len());
    }

    /// Finalize `context` with `status_code` and report it to the monitor.
    /// Returns the finalized context.
    pub fn end(&self, context: &RequestContext, status_code: u16) -> RequestContext {
        let duration_ms = context.started.elapsed().as_secs_f64() * 1000.0;

        let mut finished = context.clone();
        finished.status_code = Some(status_code);
        finished.duration_ms = Some(duration_ms);

        if let Some(mut stored) = self.contexts.get_mut(&context.request_id) {
            if stored.started == context.started {
                stored.status_code = Some(status_code);
                stored.duration_ms = Some(duration_ms);
            }
        }

        self.monitor.record_sample(RequestSample {
            request_id: Some(&context.request_id),
            method: &context.method,
            path: &context.path,
            duration_ms,
            status_code,
            is_error: status_code >= 400,
        });

        tracing::debug!(
            request_id = %context.request_id,
            status = status_code,
            duration_ms,
            "Request completed"
        );
        finished
    }

    pub fn get(&self, request_id: &str) -> Option<RequestContext> {
        self.contexts.get(request_id).map(|ctx| ctx.value().clone())
    }

    /// Contexts currently retained (finished or not).
    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Contexts still waiting for a response.
    pub fn active_count(&self) -> usize {
        self.contexts.iter().filter(|ctx| !ctx.is_finished()).count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Scoped handle on an in-flight request. Reports completion exactly once:
/// through [`RequestGuard::finish`], or on drop with status 499.
pub struct RequestGuard {
    tracker: Arc<RequestTracker>,
    context: RequestContext,
    finished: bool,
}

impl RequestGuard {
    pub fn context(&self) -> &RequestContext {
        &self.context
    }

    pub fn request_id(&self) -> &str {
        &self.context.request_id
    }

    pub fn finish(mut self, status_code: u16) -> RequestContext {
        self.finished = true;
        self.tracker.end(&self.context, status_code)
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(
                request_id = %self.context.request_id,
                path = %self.context.path,
                "Request abandoned before completion"
            );
            self.tracker.end(&self.context, STATUS_CLIENT_CLOSED);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn tracker(capacity: usize) -> (Arc<RequestTracker>, Arc<MetricsMonitor>) {
        let monitor = Arc::new(MetricsMonitor::default());
        (Arc::new(RequestTracker::new(capacity, monitor.clone())), monitor)
    }

    fn request(uri: &str, id: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(id) = id {
            builder = builder.header(X_REQUEST_ID, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_supplied_id_is_reused() {
        let (tracker, _) = tracker(10);
        let guard = tracker.begin(&request("/a", Some("abc-123")), "1.2.3.4");
        assert_eq!(guard.request_id(), "abc-123");
        guard.finish(200);
    }

    #[test]
    fn test_missing_id_is_generated() {
        let (tracker, _) = tracker(10);
        let first = tracker.begin(&request("/a", None), "c");
        let second = tracker.begin(&request("/a", None), "c");
        assert!(Uuid::parse_str(first.request_id()).is_ok());
        assert_ne!(first.request_id(), second.request_id());
    }

    #[test]
    fn test_context_captures_request() {
        let (tracker, _) = tracker(10);
        let mut req = request("/api/devices?page=2&sort=name", Some("ctx"));
        req.headers_mut()
            .insert("traceparent", "00-abc-def-01".parse().unwrap());

        let guard = tracker.begin(&req, "10.1.1.1");
        let ctx = guard.context();
        assert_eq!(ctx.method, "GET");
        assert_eq!(ctx.path, "/api/devices");
        assert_eq!(ctx.query.get("page").map(String::as_str), Some("2"));
        assert_eq!(ctx.client_addr, "10.1.1.1");
        assert_eq!(ctx.trace.traceparent.as_deref(), Some("00-abc-def-01"));
        assert!(!ctx.is_finished());

        let finished = guard.finish(201);
        assert_eq!(finished.status_code, Some(201));
        assert!(finished.duration_ms.unwrap() >= 0.0);
        assert_eq!(tracker.get("ctx").unwrap().status_code, Some(201));
    }

    #[test]
    fn test_finish_reports_once_to_monitor() {
        let (tracker, monitor) = tracker(10);
        tracker.begin(&request("/x", None), "c").finish(404);

        let stats = monitor.get_endpoint("GET", "/x").unwrap();
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.error_count, 1);
    }

    #[test]
    fn test_drop_without_finish_records_client_closed() {
        let (tracker, monitor) = tracker(10);
        {
            let _guard = tracker.begin(&request("/slow", Some("gone")), "c");
        }
        let stats = monitor.get_endpoint("GET", "/slow").unwrap();
        assert_eq!(stats.call_count, 1);
        assert_eq!(stats.status_codes.get(&STATUS_CLIENT_CLOSED), Some(&1));
        assert_eq!(tracker.get("gone").unwrap().status_code, Some(STATUS_CLIENT_CLOSED));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let (tracker, _) = tracker(3);
        for i in 0..5 {
            tracker
                .begin(&request("/e", Some(&format!("r{}", i))), "c")
                .finish(200);
        }
        assert_eq!(tracker.len(), 3);
        assert!(tracker.get("r0").is_none());
        assert!(tracker.get("r1").is_none());
        assert!(tracker.get("r4").is_some());
    }

    #[test]
    fn test_reused_id_is_not_evicted_by_stale_order_entry() {
        let (tracker, _) = tracker(2);
        tracker.begin(&request("/e", Some("dup")), "c").finish(200);
        tracker.begin(&request("/e", Some("other")), "c").finish(200);
        tracker.begin(&request("/e", Some("dup")), "c").finish(200);
        tracker.begin(&request("/e", Some("new")), "c").finish(200);

        assert_eq!(tracker.len(), 2);
        assert!(tracker.get("dup").is_some(), "newest dup survives");
        assert!(tracker.get("new").is_some());
        assert!(tracker.get("other").is_none());
    }

    #[test]
    fn test_active_count() {
        let (tracker, _) = tracker(10);
        let open = tracker.begin(&request("/a", None), "c");
        tracker.begin(&request("/b", None), "c").finish(200);
        assert_eq!(tracker.active_count(), 1);
        open.finish(200);
        assert_eq!(tracker.active_count(), 0);
    }
}
