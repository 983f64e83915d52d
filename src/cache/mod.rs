//! Cache Module
//!
//! Provides the time-bounded read-through cache used in front of every
//! upstream, together with its metrics recorder.

mod entry;
mod metrics;
mod store;


// Re-export public types
pub use entry::{CacheEntry, Freshness};
pub use metrics::{
    CacheCounters, CacheMetrics, ErrorRecord, MetricKind, MetricsRecorder, MetricsSnapshot,
    PerformanceStats, MAX_ERROR_SAMPLES, MAX_LATENCY_SAMPLES,
};
pub use store::{normalize_key, CacheStatus, Cached, ReadThroughCache};
