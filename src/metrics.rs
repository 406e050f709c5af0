//! Service metrics
//!
//! Atomic counters, gauges and latency histograms for the scrape and search
//! pipeline, with Prometheus exposition text for the `/metrics` endpoint.

use std::fmt::Write as FmtWrite;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Atomic counter for thread-safe incrementing
#[derive(Debug, Default)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, n: u64) {
        self.value.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Atomic gauge for thread-safe value tracking
#[derive(Debug, Default)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// Simple histogram for latency tracking
#[derive(Debug)]
pub struct Histogram {
    /// Bucket boundaries in microseconds
    buckets: Vec<u64>,
    counts: Vec<AtomicU64>,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    /// Buckets sized for scrape latencies: 10ms .. 30s
    pub fn new_latency() -> Self {
        let buckets = vec![
            10_000, 50_000, 100_000, 250_000, 500_000, 1_000_000, 2_500_000, 5_000_000,
            10_000_000, 30_000_000,
        ];
        let counts = buckets.iter().map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, duration: Duration) {
        let micros = duration.as_micros() as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        for (i, &boundary) in self.buckets.iter().enumerate() {
            if micros <= boundary {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
                return;
            }
        }
        self.overflow.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn mean_ms(&self) -> f64 {
        let count = self.count.load(Ordering::Relaxed);
        if count == 0 {
            return 0.0;
        }
        self.sum.load(Ordering::Relaxed) as f64 / count as f64 / 1000.0
    }

    fn bucket_boundaries(&self) -> &[u64] {
        &self.buckets
    }

    fn bucket_counts(&self) -> Vec<u64> {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    fn sum_micros(&self) -> u64 {
        self.sum.load(Ordering::Relaxed)
    }
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new_latency()
    }
}

/// All service metrics
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    // Scrape pipeline
    pub scrape_requests_total: Counter,
    pub scrape_failures_total: Counter,
    pub scrape_latency: Histogram,
    pub cache_hits_total: Counter,
    pub cache_misses_total: Counter,
    pub fast_fetch_hits_total: Counter,

    // Browser lifecycle
    pub browser_fetches_total: Counter,
    pub browser_launches_total: Counter,
    pub browser_recycles_total: Counter,
    pub browser_disconnects_total: Counter,

    // Search
    pub search_requests_total: Counter,
    pub search_failures_total: Counter,

    // HTTP surface
    pub http_requests_total: Counter,
}

impl ServiceMetrics {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Export all metrics in Prometheus exposition format
    pub fn to_prometheus(&self) -> String {
        let mut out = String::with_capacity(2048);

        write_counter(&mut out, "webmark_scrape_requests_total", "Total scrape requests", self.scrape_requests_total.get());
        write_counter(&mut out, "webmark_scrape_failures_total", "Total failed scrapes", self.scrape_failures_total.get());
        write_histogram(&mut out, "webmark_scrape_latency_seconds", "Scrape latency in seconds", &self.scrape_latency);
        write_counter(&mut out, "webmark_cache_hits_total", "Result cache hits", self.cache_hits_total.get());
        write_counter(&mut out, "webmark_cache_misses_total", "Result cache misses", self.cache_misses_total.get());
        write_counter(&mut out, "webmark_fast_fetch_hits_total", "Scrapes served by the fast HTTP tier", self.fast_fetch_hits_total.get());

        write_counter(&mut out, "webmark_browser_fetches_total", "Scrapes served by the browser tier", self.browser_fetches_total.get());
        write_counter(&mut out, "webmark_browser_launches_total", "Browser process launches", self.browser_launches_total.get());
        write_counter(&mut out, "webmark_browser_recycles_total", "Browser recycles after hitting the request budget", self.browser_recycles_total.get());
        write_counter(&mut out, "webmark_browser_disconnects_total", "Unexpected browser disconnects", self.browser_disconnects_total.get());

        write_counter(&mut out, "webmark_search_requests_total", "Total search requests", self.search_requests_total.get());
        write_counter(&mut out, "webmark_search_failures_total", "Total failed searches", self.search_failures_total.get());

        write_counter(&mut out, "webmark_http_requests_total", "Total HTTP requests", self.http_requests_total.get());

        out
    }
}

fn write_counter(out: &mut String, name: &str, help: &str, value: u64) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} counter", name);
    let _ = writeln!(out, "{} {}", name, value);
    let _ = writeln!(out);
}

fn write_histogram(out: &mut String, name: &str, help: &str, hist: &Histogram) {
    let _ = writeln!(out, "# HELP {} {}", name, help);
    let _ = writeln!(out, "# TYPE {} histogram", name);

    let boundaries = hist.bucket_boundaries();
    let counts = hist.bucket_counts();

    let mut cumulative: u64 = 0;
    for (i, &boundary) in boundaries.iter().enumerate() {
        cumulative += counts[i];
        let le_seconds = boundary as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_bucket{{le=\"{:.3}\"}} {}", name, le_seconds, cumulative);
    }
    let total = hist.count();
    let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", name, total);
    let _ = writeln!(out, "{}_sum {:.6}", name, hist.sum_micros() as f64 / 1_000_000.0);
    let _ = writeln!(out, "{}_count {}", name, total);
    let _ = writeln!(out);
}
