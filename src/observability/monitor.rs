//! In-process request metrics.
//!
//! Per-endpoint counters live in a sharded map, so concurrent requests to
//! different endpoints never contend and requests to the same endpoint are
//! serialized only for the increment itself. Recent activity is kept in
//! bounded rings. A reset takes the epoch lock exclusively, so it never
//! interleaves with a half-applied `record`.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use hdrhistogram::{CreationError, Histogram};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use crate::config::MonitorConfig;
use crate::observability::metrics;

/// Identity of an endpoint: method plus request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EndpointKey {
    pub method: String,
    pub path: String,
}

impl EndpointKey {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
        }
    }
}

/// One completed request as handed to [`MetricsMonitor::record_sample`].
#[derive(Debug, Clone, Copy)]
pub struct RequestSample<'a> {
    pub request_id: Option<&'a str>,
    pub method: &'a str,
    pub path: &'a str,
    pub duration_ms: f64,
    pub status_code: u16,
    pub is_error: bool,
}

/// Entry of the recent-requests and recent-errors rings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestSummary {
    pub timestamp: DateTime<Utc>,
    pub request_id: Option<String>,
    pub method: String,
    pub path: String,
    pub status_code: u16,
    pub duration_ms: f64,
    pub is_error: bool,
}

#[derive(Debug, Clone, Copy)]
struct RecentCall {
    duration_ms: f64,
}

/// Latency histogram bounds, in microseconds: 1 us to 10 minutes.
const HIST_LOW_US: u64 = 1;
const HIST_HIGH_US: u64 = 600_000_000;
const HIST_SIGFIG: u8 = 3;

fn latency_histogram() -> Result<Histogram<u64>, CreationError> {
    Histogram::new_with_bounds(HIST_LOW_US, HIST_HIGH_US, HIST_SIGFIG)
}

fn us_to_ms(us: u64) -> f64 {
    us as f64 / 1000.0
}

#[derive(Debug)]
struct EndpointMetric {
    call_count: u64,
    total_duration_ms: f64,
    error_count: u64,
    latency_us: Histogram<u64>,
    status_codes: BTreeMap<u16, u64>,
    recent: VecDeque<RecentCall>,
    last_called: DateTime<Utc>,
}

impl EndpointMetric {
    fn new(now: DateTime<Utc>, ring_size: usize) -> Result<Self, CreationError> {
        Ok(Self {
            call_count: 0,
            total_duration_ms: 0.0,
            error_count: 0,
            latency_us: latency_histogram()?,
            status_codes: BTreeMap::new(),
            recent: VecDeque::with_capacity(ring_size),
            last_called: now,
        })
    }

    fn observe(&mut self, sample: &RequestSample<'_>, now: DateTime<Utc>, ring_size: usize) {
        self.call_count += 1;
        self.total_duration_ms += sample.duration_ms;
        if sample.is_error {
            self.error_count += 1;
        }
        // Clamp to >= 1 us; anything past the upper bound lands in the top bucket.
        let us = ((sample.duration_ms * 1000.0).round() as u64).max(HIST_LOW_US);
        self.latency_us.saturating_record(us);
        *self.status_codes.entry(sample.status_code).or_insert(0) += 1;
        self.last_called = now;

        push_bounded(
            &mut self.recent,
            RecentCall {
                duration_ms: sample.duration_ms,
            },
            ring_size,
        );
    }

    fn stats(&self, key: &EndpointKey) -> EndpointStats {
        let calls = self.call_count.max(1) as f64;
        let latency = LatencySet::from_histogram(&self.latency_us);
        let recent_avg_duration_ms = if self.recent.is_empty() {
            0.0
        } else {
            self.recent.iter().map(|c| c.duration_ms).sum::<f64>() / self.recent.len() as f64
        };
        EndpointStats {
            method: key.method.clone(),
            path: key.path.clone(),
            call_count: self.call_count,
            error_count: self.error_count,
            error_rate: self.error_count as f64 / calls,
            total_duration_ms: self.total_duration_ms,
            avg_duration_ms: self.total_duration_ms / calls,
            recent_avg_duration_ms,
            min_duration_ms: latency.min,
            max_duration_ms: latency.max,
            p50_duration_ms: latency.p50,
            p95_duration_ms: latency.p95,
            p99_duration_ms: latency.p99,
            status_codes: self.status_codes.clone(),
            last_called: self.last_called,
        }
    }
}

/// Latency extremes and quantiles in milliseconds. Zero when empty.
#[derive(Debug, Clone, Copy, Default)]
struct LatencySet {
    min: f64,
    max: f64,
    p50: f64,
    p95: f64,
    p99: f64,
}

impl LatencySet {
    fn from_histogram(hist: &Histogram<u64>) -> Self {
        if hist.len() == 0 {
            return Self::default();
        }
        Self {
            min: us_to_ms(hist.min()),
            max: us_to_ms(hist.max()),
            p50: us_to_ms(hist.value_at_percentile(50.0)),
            p95: us_to_ms(hist.value_at_percentile(95.0)),
            p99: us_to_ms(hist.value_at_percentile(99.0)),
        }
    }
}

fn push_bounded<T>(ring: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while ring.len() >= capacity {
        ring.pop_front();
    }
    ring.push_back(item);
}

/// Read-only view of one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EndpointStats {
    pub method: String,
    pub path: String,
    pub call_count: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub total_duration_ms: f64,
    pub avg_duration_ms: f64,
    /// Mean over the endpoint's recent ring only.
    pub recent_avg_duration_ms: f64,
    /// Extremes and quantiles come from a histogram with three significant
    /// figures, so they are accurate to about 0.1%.
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub p50_duration_ms: f64,
    pub p95_duration_ms: f64,
    pub p99_duration_ms: f64,
    pub status_codes: BTreeMap<u16, u64>,
    pub last_called: DateTime<Utc>,
}

/// Aggregate view across all endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonitorSummary {
    pub total_requests: u64,
    pub total_errors: u64,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub endpoints_tracked: usize,
    pub uptime_secs: u64,
    /// Seconds since the last reset (or start).
    pub window_secs: u64,
    pub requests_per_minute: f64,
}

/// Status codes individually and rolled up by class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusDistribution {
    pub by_code: BTreeMap<u16, u64>,
    pub by_class: BTreeMap<&'static str, u64>,
}

fn status_class(code: u16) -> Option<&'static str> {
    match code {
        200..=299 => Some("2xx"),
        300..=399 => Some("3xx"),
        400..=499 => Some("4xx"),
        500..=599 => Some("5xx"),
        _ => None,
    }
}

/// Shared metrics store, built once at startup and handed to the pipeline
/// and the monitoring endpoints.
pub struct MetricsMonitor {
    endpoints: DashMap<EndpointKey, EndpointMetric>,
    recent: Mutex<VecDeque<RequestSummary>>,
    recent_errors: Mutex<VecDeque<RequestSummary>>,
    /// Start of the current counting epoch; write-locked by `reset`.
    epoch: RwLock<Instant>,
    started_at: Instant,
    config: MonitorConfig,
}

impl MetricsMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        let now = Instant::now();
        Self {
            endpoints: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(config.recent_events_capacity)),
            recent_errors: Mutex::new(VecDeque::with_capacity(config.recent_errors_capacity)),
            epoch: RwLock::new(now),
            started_at: now,
            config,
        }
    }

    /// Time since the monitor was created. Unaffected by `reset`.
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Record one completed request.
    pub fn record(
        &self,
        path: &str,
        method: &str,
        duration_ms: f64,
        status_code: u16,
        is_error: bool,
    ) {
        self.record_sample(RequestSample {
            request_id: None,
            method,
            path,
            duration_ms,
            status_code,
            is_error,
        });
    }

    /// Record one completed request. Malformed samples are logged and
    /// dropped; recording never fails the caller.
    pub fn record_sample(&self, sample: RequestSample<'_>) {
        let duration = match validate(&sample) {
            Ok(duration) => duration,
            Err(reason) => {
                tracing::warn!(
                    path = sample.path,
                    method = sample.method,
                    duration_ms = sample.duration_ms,
                    status_code = sample.status_code,
                    reason,
                    "Dropping malformed metrics sample"
                );
                return;
            }
        };

        let _epoch = self.epoch.read();
        let now = Utc::now();
        let ring_size = self.config.endpoint_ring_size;

        let mut metric = match self.endpoints.entry(EndpointKey::new(sample.method, sample.path)) {
            Entry::Occupied(entry) => entry.into_ref(),
            Entry::Vacant(entry) => match EndpointMetric::new(now, ring_size) {
                Ok(metric) => entry.insert(metric),
                Err(e) => {
                    tracing::warn!(error = %e, path = sample.path, "Failed to create latency histogram");
                    return;
                }
            },
        };
        metric.observe(&sample, now, ring_size);
        drop(metric);

        let summary = RequestSummary {
            timestamp: now,
            request_id: sample.request_id.map(str::to_string),
            method: sample.method.to_ascii_uppercase(),
            path: sample.path.to_string(),
            status_code: sample.status_code,
            duration_ms: sample.duration_ms,
            is_error: sample.is_error,
        };
        if sample.is_error {
            push_bounded(
                &mut self.recent_errors.lock(),
                summary.clone(),
                self.config.recent_errors_capacity,
            );
        }
        push_bounded(&mut self.recent.lock(), summary, self.config.recent_events_capacity);

        metrics::record_request(
            sample.method,
            sample.path,
            sample.status_code,
            duration,
        );
    }

    pub fn get_summary(&self) -> MonitorSummary {
        let epoch = self.epoch.read();

        let (mut total_requests, mut total_errors, mut total_ms) = (0u64, 0u64, 0f64);
        for entry in self.endpoints.iter() {
            total_requests += entry.call_count;
            total_errors += entry.error_count;
            total_ms += entry.total_duration_ms;
        }

        let window = epoch.elapsed();
        let minutes = window.as_secs_f64() / 60.0;
        let ratio = |num: f64| if total_requests == 0 { 0.0 } else { num / total_requests as f64 };

        MonitorSummary {
            total_requests,
            total_errors,
            error_rate: ratio(total_errors as f64),
            avg_duration_ms: ratio(total_ms),
            endpoints_tracked: self.endpoints.len(),
            uptime_secs: self.started_at.elapsed().as_secs(),
            window_secs: window.as_secs(),
            requests_per_minute: if minutes > 0.0 { total_requests as f64 / minutes } else { 0.0 },
        }
    }

    /// Every endpoint, busiest first.
    pub fn get_all_metrics(&self) -> Vec<EndpointStats> {
        let mut all = self.collect_stats();
        all.sort_by(|a, b| {
            b.call_count
                .cmp(&a.call_count)
                .then_with(|| (&a.path, &a.method).cmp(&(&b.path, &b.method)))
        });
        all
    }

    pub fn get_endpoint(&self, method: &str, path: &str) -> Option<EndpointStats> {
        let _epoch = self.epoch.read();
        let key = EndpointKey::new(method, path);
        self.endpoints.get(&key).map(|metric| metric.stats(&key))
    }

    /// Endpoints with the highest average duration.
    pub fn get_slow_endpoints(&self, limit: usize) -> Vec<EndpointStats> {
        let mut all = self.collect_stats();
        all.sort_by(|a, b| b.avg_duration_ms.total_cmp(&a.avg_duration_ms));
        all.truncate(limit);
        all
    }

    /// Endpoints that have failed at least once, highest error rate first.
    pub fn get_error_endpoints(&self, limit: usize) -> Vec<EndpointStats> {
        let mut failing: Vec<_> = self
            .collect_stats()
            .into_iter()
            .filter(|s| s.error_count > 0)
            .collect();
        failing.sort_by(|a, b| {
            b.error_rate
                .total_cmp(&a.error_rate)
                .then_with(|| b.error_count.cmp(&a.error_count))
        });
        failing.truncate(limit);
        failing
    }

    /// Most recent requests, newest first.
    pub fn get_recent_requests(&self, limit: usize) -> Vec<RequestSummary> {
        let _epoch = self.epoch.read();
        let recent = self.recent.lock();
        recent.iter().rev().take(limit).cloned().collect()
    }

    /// Most recent failed requests, newest first.
    pub fn get_recent_errors(&self, limit: usize) -> Vec<RequestSummary> {
        let _epoch = self.epoch.read();
        let errors = self.recent_errors.lock();
        errors.iter().rev().take(limit).cloned().collect()
    }

    pub fn get_status_code_distribution(&self) -> StatusDistribution {
        let _epoch = self.epoch.read();
        let mut by_code = BTreeMap::new();
        let mut by_class: BTreeMap<&'static str, u64> =
            ["2xx", "3xx", "4xx", "5xx"].into_iter().map(|c| (c, 0)).collect();

        for entry in self.endpoints.iter() {
            for (&code, &count) in &entry.status_codes {
                *by_code.entry(code).or_insert(0) += count;
                if let Some(class) = status_class(code) {
                    *by_class.entry(class).or_insert(0) += count;
                }
            }
        }
        StatusDistribution { by_code, by_class }
    }

    /// Clear every counter and ring. Administrative use only.
    pub fn reset(&self) {
        let mut epoch = self.epoch.write();
        self.endpoints.clear();
        self.recent.lock().clear();
        self.recent_errors.lock().clear();
        *epoch = Instant::now();
        tracing::info!("Metrics monitor reset");
    }

    fn collect_stats(&self) -> Vec<EndpointStats> {
        let _epoch = self.epoch.read();
        self.endpoints
            .iter()
            .map(|entry| entry.value().stats(entry.key()))
            .collect()
    }
}

impl Default for MetricsMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

fn validate(sample: &RequestSample<'_>) -> Result<Duration, &'static str> {
    if !sample.duration_ms.is_finite() || sample.duration_ms < 0.0 {
        return Err("duration must be a non-negative finite number");
    }
    let duration = Duration::try_from_secs_f64(sample.duration_ms / 1000.0)
        .map_err(|_| "duration out of range")?;
    if !(100..=999).contains(&sample.status_code) {
        return Err("status code out of range");
    }
    if sample.path.is_empty() || sample.method.is_empty() {
        return Err("method and path are required");
    }
    Ok(duration)
}
