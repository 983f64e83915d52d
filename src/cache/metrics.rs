//! Cache Metrics Module
//!
//! Process-lifetime counters for hits, misses and errors, plus bounded
//! buffers of recent latency samples and error records.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::Serialize;

/// Latency samples kept for average and p95.
pub const MAX_LATENCY_SAMPLES: usize = 100;

/// Error records kept for the snapshot.
pub const MAX_ERROR_SAMPLES: usize = 10;

// == Metric Kind ==
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Hit,
    Miss,
    Error,
}

// == Error Record ==
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// RFC 3339 time the error was recorded
    pub timestamp: String,
    pub error: String,
}

// == Cache Metrics ==
/// Raw counters and sample buffers.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
    /// Oldest sample at the front
    latency: VecDeque<f64>,
    /// Most recent error at the front
    last_errors: VecDeque<ErrorRecord>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    // == Record ==
    /// Increments the counter for `kind` and stores the optional samples.
    pub fn record(&mut self, kind: MetricKind, latency_ms: Option<f64>, error: Option<&str>) {
        match kind {
            MetricKind::Hit => self.hits += 1,
            MetricKind::Miss => self.misses += 1,
            MetricKind::Error => {
                self.errors += 1;
                self.last_errors.push_front(ErrorRecord {
                    timestamp: chrono::Utc::now().to_rfc3339(),
                    error: error.unwrap_or("Unknown error").to_string(),
                });
                self.last_errors.truncate(MAX_ERROR_SAMPLES);
            }
        }

        if let Some(latency) = latency_ms {
            self.latency.push_back(latency);
            while self.latency.len() > MAX_LATENCY_SAMPLES {
                self.latency.pop_front();
            }
        }
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        ratio(self.hits, self.hits + self.misses)
    }

    /// Returns errors / (hits + misses), or 0.0 if no requests have been made.
    pub fn error_rate(&self) -> f64 {
        ratio(self.errors, self.hits + self.misses)
    }

    pub fn latency_samples(&self) -> Vec<f64> {
        self.latency.iter().copied().collect()
    }

    pub fn last_errors(&self) -> Vec<ErrorRecord> {
        self.last_errors.iter().cloned().collect()
    }

    /// Mean of the current samples, rounded to whole milliseconds.
    pub fn average_latency_ms(&self) -> u64 {
        if self.latency.is_empty() {
            return 0;
        }
        let sum: f64 = self.latency.iter().sum();
        (sum / self.latency.len() as f64).round() as u64
    }

    /// Sample at sorted index `floor(0.95 * len)`, rounded to whole milliseconds.
    pub fn p95_latency_ms(&self) -> u64 {
        if self.latency.is_empty() {
            return 0;
        }
        let mut sorted = self.latency_samples();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let index = ((sorted.len() as f64) * 0.95).floor() as usize;
        sorted[index.min(sorted.len() - 1)].round() as u64
    }

    // == Snapshot ==
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            cache: CacheCounters {
                hits: self.hits,
                misses: self.misses,
                hit_rate: self.hit_rate(),
                errors: self.errors,
                error_rate: self.error_rate(),
            },
            performance: PerformanceStats {
                avg_latency_ms: self.average_latency_ms(),
                p95_latency_ms: self.p95_latency_ms(),
                sample_size: self.latency.len(),
            },
            last_errors: self.last_errors(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

// == Metrics Recorder ==
/// Thread-safe wrapper shared by a cache and the metrics endpoint.
#[derive(Debug, Default)]
pub struct MetricsRecorder {
    inner: Mutex<CacheMetrics>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, kind: MetricKind, latency_ms: Option<f64>, error: Option<&str>) {
        self.lock().record(kind, latency_ms, error);
    }

    pub fn record_hit(&self, latency_ms: Option<f64>) {
        self.record(MetricKind::Hit, latency_ms, None);
    }

    pub fn record_miss(&self, latency_ms: Option<f64>) {
        self.record(MetricKind::Miss, latency_ms, None);
    }

    pub fn record_error(&self, latency_ms: Option<f64>, error: &str) {
        self.record(MetricKind::Error, latency_ms, Some(error));
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.lock().snapshot()
    }

    /// Copy of the raw counters and buffers.
    pub fn raw(&self) -> CacheMetrics {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheMetrics> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// == Snapshot Types ==
/// Read-side view served by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub cache: CacheCounters,
    pub performance: PerformanceStats,
    pub last_errors: Vec<ErrorRecord>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheCounters {
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub errors: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceStats {
    pub avg_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub sample_size: usize,
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hits, 0);
        assert_eq!(metrics.misses, 0);
        assert_eq!(metrics.errors, 0);
        assert!(metrics.latency_samples().is_empty());
    }

    #[test]
    fn test_rates_without_requests_are_zero() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.hit_rate(), 0.0);
        assert_eq!(metrics.error_rate(), 0.0);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cache.hit_rate, 0.0);
        assert_eq!(snapshot.performance.avg_latency_ms, 0);
        assert_eq!(snapshot.performance.p95_latency_ms, 0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut metrics = CacheMetrics::new();
        metrics.record(MetricKind::Hit, None, None);
        metrics.record(MetricKind::Hit, None, None);
        metrics.record(MetricKind::Hit, None, None);
        metrics.record(MetricKind::Miss, None, None);
        metrics.record(MetricKind::Error, None, Some("boom"));
        assert_eq!(metrics.hit_rate(), 0.75);
        assert_eq!(metrics.error_rate(), 0.25);
    }

    #[test]
    fn test_latency_buffer_keeps_most_recent_hundred() {
        let mut metrics = CacheMetrics::new();
        for i in 0..150 {
            metrics.record(MetricKind::Hit, Some(i as f64), None);
        }

        let samples = metrics.latency_samples();
        assert_eq!(samples.len(), MAX_LATENCY_SAMPLES);
        assert_eq!(samples.first(), Some(&50.0));
        assert_eq!(samples.last(), Some(&149.0));
    }

    #[test]
    fn test_error_buffer_keeps_most_recent_ten() {
        let mut metrics = CacheMetrics::new();
        for i in 0..15 {
            metrics.record(MetricKind::Error, None, Some(&format!("error {}", i)));
        }

        let errors = metrics.last_errors();
        assert_eq!(errors.len(), MAX_ERROR_SAMPLES);
        assert_eq!(errors[0].error, "error 14");
        assert_eq!(errors[9].error, "error 5");
        assert_eq!(metrics.errors, 15);
    }

    #[test]
    fn test_missing_error_message() {
        let mut metrics = CacheMetrics::new();
        metrics.record(MetricKind::Error, None, None);
        assert_eq!(metrics.last_errors()[0].error, "Unknown error");
    }

    #[test]
    fn test_p95_uses_floor_index() {
        let mut metrics = CacheMetrics::new();
        // Insert out of order to exercise sorting
        for i in (1..=100).rev() {
            metrics.record(MetricKind::Hit, Some((i * 10) as f64), None);
        }

        let snapshot = metrics.snapshot();
        // floor(0.95 * 100) = 95 -> sorted[95] = 960
        assert_eq!(snapshot.performance.p95_latency_ms, 960);
        assert_eq!(snapshot.performance.avg_latency_ms, 505);
        assert_eq!(snapshot.performance.sample_size, 100);
    }

    #[test]
    fn test_p95_single_sample() {
        let mut metrics = CacheMetrics::new();
        metrics.record(MetricKind::Miss, Some(42.4), None);
        assert_eq!(metrics.p95_latency_ms(), 42);
    }

    #[test]
    fn test_snapshot_json_shape() {
        let recorder = MetricsRecorder::new();
        recorder.record_hit(Some(12.0));
        recorder.record_error(Some(30.0), "HTTP error! status: 502");

        let json = serde_json::to_value(recorder.snapshot()).unwrap();
        assert_eq!(json["cache"]["hits"], 1);
        assert!(json["cache"]["hitRate"].is_number());
        assert!(json["cache"]["errorRate"].is_number());
        assert_eq!(json["performance"]["sampleSize"], 2);
        assert!(json["performance"]["p95LatencyMs"].is_number());
        assert_eq!(json["lastErrors"][0]["error"], "HTTP error! status: 502");
        assert!(json["timestamp"].is_string());
    }
}
