// Metrics collection and tracking

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tts_core::{HandleReport, Outcome};

/// Latency samples kept for percentiles.
const MAX_SAMPLES: usize = 1000;

/// Per-endpoint request and latency counters
#[derive(Debug, Clone)]
pub struct EndpointMetrics {
    request_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    total_latency_ms: Arc<AtomicU64>,
    min_latency_ms: Arc<AtomicU64>,
    max_latency_ms: Arc<AtomicU64>,
    latency_samples: Arc<Mutex<VecDeque<u64>>>,
}

impl EndpointMetrics {
    pub fn new() -> Self {
        Self {
            request_count: Arc::new(AtomicU64::new(0)),
            error_count: Arc::new(AtomicU64::new(0)),
            total_latency_ms: Arc::new(AtomicU64::new(0)),
            min_latency_ms: Arc::new(AtomicU64::new(u64::MAX)),
            max_latency_ms: Arc::new(AtomicU64::new(0)),
            latency_samples: Arc::new(Mutex::new(VecDeque::with_capacity(MAX_SAMPLES))),
        }
    }

    pub fn record_request(&self, latency_ms: u64) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.total_latency_ms.fetch_add(latency_ms, Ordering::Relaxed);
        self.min_latency_ms.fetch_min(latency_ms, Ordering::Relaxed);
        self.max_latency_ms.fetch_max(latency_ms, Ordering::Relaxed);

        if let Ok(mut samples) = self.latency_samples.lock() {
            if samples.len() == MAX_SAMPLES {
                samples.pop_front();
            }
            samples.push_back(latency_ms);
        }
    }

    pub fn record_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn avg_latency_ms(&self) -> f64 {
        let count = self.request_count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.total_latency_ms.load(Ordering::Relaxed) as f64 / count as f64
    }

    fn percentile(&self, p: usize) -> u64 {
        let Ok(samples) = self.latency_samples.lock() else {
            return 0;
        };
        if samples.is_empty() {
            return 0;
        }
        let mut sorted: Vec<u64> = samples.iter().copied().collect();
        sorted.sort_unstable();
        sorted[(sorted.len() * p / 100).min(sorted.len() - 1)]
    }

    pub fn stats(&self) -> EndpointStats {
        let min = self.min_latency_ms.load(Ordering::Relaxed);
        EndpointStats {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            avg_latency_ms: self.avg_latency_ms(),
            min_latency_ms: if min == u64::MAX { 0 } else { min },
            max_latency_ms: self.max_latency_ms.load(Ordering::Relaxed),
            p50_latency_ms: self.percentile(50),
            p95_latency_ms: self.percentile(95),
            p99_latency_ms: self.percentile(99),
        }
    }
}

impl Default for EndpointMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Delivery counters derived from coordinator reports
#[derive(Debug, Clone, Default)]
pub struct SpeakMetrics {
    look_ahead_deliveries: Arc<AtomicU64>,
    fresh_deliveries: Arc<AtomicU64>,
    silent_calls: Arc<AtomicU64>,
    no_profile_calls: Arc<AtomicU64>,
    cancelled_calls: Arc<AtomicU64>,
    bytes_delivered: Arc<AtomicU64>,
}

impl SpeakMetrics {
    pub fn record(&self, report: &HandleReport) {
        match report.outcome {
            Outcome::NoProfiles => {
                self.no_profile_calls.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Cancelled => {
                self.cancelled_calls.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::Blank | Outcome::Completed => {}
        }
        if report.cached_bytes > 0 {
            self.look_ahead_deliveries.fetch_add(1, Ordering::Relaxed);
        }
        if report.fresh_bytes > 0 {
            self.fresh_deliveries.fetch_add(1, Ordering::Relaxed);
        }
        if report.outcome == Outcome::Completed && report.total_bytes() == 0 {
            self.silent_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.bytes_delivered
            .fetch_add(report.total_bytes() as u64, Ordering::Relaxed);
    }

    pub fn stats(&self) -> SpeakStats {
        SpeakStats {
            look_ahead_deliveries: self.look_ahead_deliveries.load(Ordering::Relaxed),
            fresh_deliveries: self.fresh_deliveries.load(Ordering::Relaxed),
            silent_calls: self.silent_calls.load(Ordering::Relaxed),
            no_profile_calls: self.no_profile_calls.load(Ordering::Relaxed),
            cancelled_calls: self.cancelled_calls.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppMetrics {
    pub speak: EndpointMetrics,
    pub deliveries: SpeakMetrics,
}

impl AppMetrics {
    pub fn record(&self, report: &HandleReport, latency_ms: u64) {
        self.speak.record_request(latency_ms);
        if report.outcome != Outcome::Completed && report.outcome != Outcome::Blank {
            self.speak.record_error();
        }
        self.deliveries.record(report);
    }
}

#[derive(Serialize)]
pub struct MetricsResponse {
    pub timestamp: DateTime<Utc>,
    pub system: SystemMetrics,
    pub speak: EndpointStats,
    pub deliveries: SpeakStats,
}

#[derive(Serialize)]
pub struct SystemMetrics {
    pub cpu_usage_percent: f32,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub memory_usage_percent: f32,
    pub request_count: u64,
    pub uptime_seconds: u64,
    pub synthesizing: bool,
}

#[derive(Serialize, Debug, PartialEq)]
pub struct EndpointStats {
    pub request_count: u64,
    pub error_count: u64,
    pub avg_latency_ms: f64,
    pub min_latency_ms: u64,
    pub max_latency_ms: u64,
    pub p50_latency_ms: u64,
    pub p95_latency_ms: u64,
    pub p99_latency_ms: u64,
}

#[derive(Serialize, Debug, PartialEq, Eq)]
pub struct SpeakStats {
    pub look_ahead_deliveries: u64,
    pub fresh_deliveries: u64,
    pub silent_calls: u64,
    pub no_profile_calls: u64,
    pub cancelled_calls: u64,
    pub bytes_delivered: u64,
}
