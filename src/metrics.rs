//! Metrics instrumentation for fleet-dns.
//!
//! All metrics are prefixed with `fleet_dns.`

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record a resolved DNS query.
pub fn record_query(record_type: &str, result: QueryResult, duration: std::time::Duration) {
    let result_str = match result {
        QueryResult::Success => "success",
        QueryResult::NxDomain => "nxdomain",
        QueryResult::ServFail => "servfail",
        QueryResult::Unsupported => "unsupported",
    };

    counter!("fleet_dns.query.count", "type" => record_type.to_string(), "result" => result_str)
        .increment(1);
    histogram!("fleet_dns.query.duration.seconds", "type" => record_type.to_string())
        .record(duration.as_secs_f64());
}

/// Query result classes for metrics.
#[derive(Debug, Clone, Copy)]
pub enum QueryResult {
    /// Query returned records.
    Success,
    /// No records, answered as a name error.
    NxDomain,
    /// Backend or transport failure, answered as a server failure.
    ServFail,
    /// Query type this server does not build answers for.
    Unsupported,
}

/// Record a cache hit.
pub fn record_cache_hit() {
    counter!("fleet_dns.cache.hit.count").increment(1);
}

/// Record a cache miss that starts a new population.
pub fn record_cache_miss() {
    counter!("fleet_dns.cache.miss.count").increment(1);
}

/// Record a cache miss that joined an in-flight population.
pub fn record_cache_wait() {
    counter!("fleet_dns.cache.wait.count").increment(1);
}

/// Record a cache entry expiry.
pub fn record_cache_expiry() {
    counter!("fleet_dns.cache.expiry.count").increment(1);
}

/// Record the number of live cache entries (call periodically).
pub fn record_cache_size(entries: usize) {
    gauge!("fleet_dns.cache.entries").set(entries as f64);
}

/// Which inventory fallback path a query took.
#[derive(Debug, Clone, Copy)]
pub enum FallbackKind {
    /// Forward lookup: name -> address.
    Forward,
    /// Reverse lookup: address -> name.
    Reverse,
}

/// Record an inventory fallback after a not-found plain lookup.
pub fn record_fallback(kind: FallbackKind) {
    let kind_str = match kind {
        FallbackKind::Forward => "forward",
        FallbackKind::Reverse => "reverse",
    };
    counter!("fleet_dns.fallback.count", "kind" => kind_str).increment(1);
}

/// Record one inventory backend call.
pub fn record_inventory_call(instances: usize, ok: bool, duration: std::time::Duration) {
    let result = if ok { "success" } else { "error" };
    counter!("fleet_dns.inventory.call.count", "result" => result).increment(1);
    histogram!("fleet_dns.inventory.call.duration.seconds").record(duration.as_secs_f64());
    if ok {
        histogram!("fleet_dns.inventory.instances_returned").record(instances as f64);
    }
}

/// Helper for timing operations.
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since timer start.
    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }
}
