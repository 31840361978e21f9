use lazy_static::lazy_static;
use prometheus::{Counter, Gauge, Histogram, register_counter, register_gauge, register_histogram};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

lazy_static! {
    pub static ref REQUEST_TOTAL: Counter =
        register_counter!("taskboard_requests_total", "Total number of requests").unwrap();
    pub static ref RATE_LIMITED: Counter =
        register_counter!("taskboard_rate_limited_total", "Requests rejected by admission control").unwrap();
    pub static ref UPSTREAM_ATTEMPTS: Counter =
        register_counter!("taskboard_upstream_attempts_total", "HTTP attempts made to the AI API").unwrap();
    pub static ref UPSTREAM_FAILURES: Counter =
        register_counter!("taskboard_upstream_failures_total", "AI API calls that ended in a fatal error").unwrap();
    pub static ref REQUEST_LATENCY: Histogram = register_histogram!(
        "taskboard_request_latency_seconds",
        "Request latency in seconds"
    )
    .unwrap();
    pub static ref RATE_LIMIT_KEYS: Gauge =
        register_gauge!("taskboard_rate_limit_keys", "Keys tracked across all limiters").unwrap();
}

pub const SLOW_THRESHOLD: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
struct Sample {
    label: String,
    duration: Duration,
    code: u16,
}

impl Sample {
    // 0 stands for a transport failure with no status
    fn is_error(&self) -> bool {
        self.code == 0 || self.code >= 400
    }

    fn is_slow(&self) -> bool {
        self.duration > SLOW_THRESHOLD
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EndpointStats {
    pub request_count: usize,
    pub avg_response_time: f64,
    pub error_count: usize,
    pub slow_requests: usize,
}

// latencies in seconds
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PerformanceStats {
    pub total_requests: usize,
    pub avg_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub slow_requests: usize,
    pub error_rate: f64,
    pub endpoint_stats: BTreeMap<String, EndpointStats>,
}

// a poisoned lock drops the sample rather than failing the request
#[derive(Default)]
pub struct MetricsRecorder {
    samples: Mutex<Vec<Sample>>,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, label: &str, duration: Duration, code: u16) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.push(Sample {
                label: label.to_string(),
                duration,
                code,
            });
        }
    }

    pub fn reset(&self) {
        if let Ok(mut samples) = self.samples.lock() {
            samples.clear();
        }
    }

    pub fn stats(&self) -> PerformanceStats {
        let samples = match self.samples.lock() {
            Ok(samples) => samples.clone(),
            Err(_) => return PerformanceStats::default(),
        };
        if samples.is_empty() {
            return PerformanceStats::default();
        }

        let n = samples.len();
        let mut sorted: Vec<f64> = samples.iter().map(|s| s.duration.as_secs_f64()).collect();
        sorted.sort_by(f64::total_cmp);

        let mut endpoint_stats: BTreeMap<String, EndpointStats> = BTreeMap::new();
        for sample in &samples {
            let entry = endpoint_stats.entry(sample.label.clone()).or_default();
            entry.request_count += 1;
            // running sum, divided below
            entry.avg_response_time += sample.duration.as_secs_f64();
            entry.error_count += usize::from(sample.is_error());
            entry.slow_requests += usize::from(sample.is_slow());
        }
        for entry in endpoint_stats.values_mut() {
            entry.avg_response_time /= entry.request_count as f64;
        }

        PerformanceStats {
            total_requests: n,
            avg_response_time: sorted.iter().sum::<f64>() / n as f64,
            p95_response_time: percentile(&sorted, 0.95),
            p99_response_time: percentile(&sorted, 0.99),
            slow_requests: samples.iter().filter(|s| s.is_slow()).count(),
            error_rate: samples.iter().filter(|s| s.is_error()).count() as f64 / n as f64,
            endpoint_stats,
        }
    }
}

// floor(q * n), clamped to the last element
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let idx = ((sorted.len() as f64) * q).floor() as usize;
    sorted[idx.min(sorted.len() - 1)]
}
