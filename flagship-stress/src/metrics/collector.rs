//! Thread-safe metrics collector.
//!
//! Workers record results concurrently: counters are lock-free atomics,
//! histograms sit behind fine-grained mutexes whose critical section is a
//! single record or snapshot, and the per-environment map uses atomic
//! lookup-or-insert.

use super::report::{
    hist_to_stats, ConnectionStats, EnvironmentResult, ErrorStats, GlobalResult, TestResult,
    ThroughputStats,
};
use super::timeseries::TimeSeriesCollector;
use crate::client::{ConnectionSample, RequestResult};
use dashmap::DashMap;
use hdrhistogram::Histogram;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Histograms track 1µs to 60s with 3 significant digits: bounded memory
/// under unbounded request counts.
fn new_histogram() -> Histogram<u64> {
    Histogram::new_with_bounds(1, 60_000_000, 3).expect("static histogram bounds are valid")
}

struct EnvCollector {
    latency_hist: Histogram<u64>,
    ttfb_hist: Histogram<u64>,
    total: u64,
    success: u64,
    failed: u64,
    bytes_recv: u64,
    status_codes: HashMap<u16, u64>,
    error_types: HashMap<String, u64>,
}

impl EnvCollector {
    fn new() -> Self {
        Self {
            latency_hist: new_histogram(),
            ttfb_hist: new_histogram(),
            total: 0,
            success: 0,
            failed: 0,
            bytes_recv: 0,
            status_codes: HashMap::new(),
            error_types: HashMap::new(),
        }
    }
}

/// Aggregates per-request records from all workers.
pub struct Collector {
    latency_hist: Mutex<Histogram<u64>>,
    ttfb_hist: Mutex<Histogram<u64>>,

    total_requests: AtomicU64,
    success_requests: AtomicU64,
    failed_requests: AtomicU64,
    total_bytes: AtomicU64,
    in_flight: AtomicI64,

    dns_total_us: AtomicU64,
    tcp_total_us: AtomicU64,
    tls_total_us: AtomicU64,
    conn_samples: AtomicU64,

    env_data: DashMap<String, Arc<Mutex<EnvCollector>>>,

    peak_rps: AtomicU32,
    current_sec_rps: AtomicU32,

    status_codes: Mutex<HashMap<u16, u64>>,
    error_types: Mutex<HashMap<String, u64>>,

    pub time_series: TimeSeriesCollector,

    start_time: Mutex<Option<Instant>>,
    peak_task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for Collector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector {
    pub fn new() -> Self {
        Self {
            latency_hist: Mutex::new(new_histogram()),
            ttfb_hist: Mutex::new(new_histogram()),
            total_requests: AtomicU64::new(0),
            success_requests: AtomicU64::new(0),
            failed_requests: AtomicU64::new(0),
            total_bytes: AtomicU64::new(0),
            in_flight: AtomicI64::new(0),
            dns_total_us: AtomicU64::new(0),
            tcp_total_us: AtomicU64::new(0),
            tls_total_us: AtomicU64::new(0),
            conn_samples: AtomicU64::new(0),
            env_data: DashMap::new(),
            peak_rps: AtomicU32::new(0),
            current_sec_rps: AtomicU32::new(0),
            status_codes: Mutex::new(HashMap::new()),
            error_types: Mutex::new(HashMap::new()),
            time_series: TimeSeriesCollector::new(),
            start_time: Mutex::new(None),
            peak_task: Mutex::new(None),
        }
    }

    /// Mark the beginning of the measured phase and start the 1s-periodic
    /// peak-RPS tracker.
    pub fn start(self: &Arc<Self>) {
        *self.start_time.lock() = Some(Instant::now());
        self.time_series.reset_start();

        let collector = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            // First tick fires immediately; skip it so windows are full.
            interval.tick().await;
            loop {
                interval.tick().await;
                collector.roll_peak_window();
            }
        });
        *self.peak_task.lock() = Some(task);
    }

    /// Close the current one-second window: retain the maximum, reset the
    /// running counter.
    fn roll_peak_window(&self) {
        let current = self.current_sec_rps.swap(0, Ordering::Relaxed);
        self.peak_rps.fetch_max(current, Ordering::Relaxed);
    }

    pub fn in_flight_inc(&self) {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
    }

    pub fn in_flight_dec(&self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    /// Process a single request result.
    pub fn record(&self, r: &RequestResult) {
        let latency_us = (r.latency.as_micros() as u64).max(1);
        let is_error = r.is_error();

        {
            let mut hist = self.latency_hist.lock();
            hist.saturating_record(latency_us);
        }
        if let Some(ttfb) = r.ttfb {
            let ttfb_us = (ttfb.as_micros() as u64).max(1);
            let mut hist = self.ttfb_hist.lock();
            hist.saturating_record(ttfb_us);
        }

        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.total_bytes.fetch_add(r.bytes_received, Ordering::Relaxed);
        self.current_sec_rps.fetch_add(1, Ordering::Relaxed);

        if is_error {
            self.failed_requests.fetch_add(1, Ordering::Relaxed);
        } else {
            self.success_requests.fetch_add(1, Ordering::Relaxed);
        }

        if r.dns_lookup.is_some() || r.tcp_connect.is_some() || r.tls_handshake.is_some() {
            self.record_connection(&ConnectionSample {
                dns: r.dns_lookup,
                tcp: r.tcp_connect,
                tls: r.tls_handshake,
            });
        }

        if let Some(code) = r.status_code {
            *self.status_codes.lock().entry(code).or_insert(0) += 1;
        }
        if let Some(error_type) = &r.error_type {
            *self.error_types.lock().entry(error_type.clone()).or_insert(0) += 1;
        }

        self.record_env(r, latency_us);

        let latency_ms = latency_us as f64 / 1000.0;
        self.time_series.record(
            latency_ms,
            is_error,
            r.bytes_received,
            self.in_flight.load(Ordering::Relaxed),
        );
    }

    /// Feed one connection-establishment sample (per-request when a
    /// handshake was observed, or from the pre-flight probe).
    pub fn record_connection(&self, sample: &ConnectionSample) {
        let us = |d: Option<Duration>| d.map_or(0, |d| d.as_micros() as u64);
        self.dns_total_us.fetch_add(us(sample.dns), Ordering::Relaxed);
        self.tcp_total_us.fetch_add(us(sample.tcp), Ordering::Relaxed);
        self.tls_total_us.fetch_add(us(sample.tls), Ordering::Relaxed);
        self.conn_samples.fetch_add(1, Ordering::Relaxed);
    }

    fn record_env(&self, r: &RequestResult, latency_us: u64) {
        let entry = self
            .env_data
            .entry(r.environment.clone())
            .or_insert_with(|| Arc::new(Mutex::new(EnvCollector::new())))
            .clone();

        let mut env = entry.lock();
        env.latency_hist.saturating_record(latency_us);
        if let Some(ttfb) = r.ttfb {
            env.ttfb_hist.saturating_record((ttfb.as_micros() as u64).max(1));
        }
        env.total += 1;
        env.bytes_recv += r.bytes_received;
        if r.is_error() {
            env.failed += 1;
        } else {
            env.success += 1;
        }
        if let Some(code) = r.status_code {
            *env.status_codes.entry(code).or_insert(0) += 1;
        }
        if let Some(error_type) = &r.error_type {
            *env.error_types.entry(error_type.clone()).or_insert(0) += 1;
        }
    }

    /// Current totals for live progress reporting.
    pub fn snapshot(&self) -> (u64, u64, u64, f64, i64) {
        let total = self.total_requests.load(Ordering::Relaxed);
        let success = self.success_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let in_flight = self.in_flight.load(Ordering::Relaxed);

        let rps = match *self.start_time.lock() {
            Some(start) if start.elapsed().as_secs_f64() > 0.0 => {
                total as f64 / start.elapsed().as_secs_f64()
            }
            _ => 0.0,
        };

        (total, success, failed, rps, in_flight)
    }

    /// Compute the final result from everything collected. Stops the
    /// peak tracker and flushes the time series.
    pub fn result(&self) -> TestResult {
        if let Some(task) = self.peak_task.lock().take() {
            task.abort();
        }
        self.roll_peak_window();

        let elapsed = self
            .start_time
            .lock()
            .map(|start| start.elapsed().as_secs_f64())
            .unwrap_or_default();

        let total = self.total_requests.load(Ordering::Relaxed);
        let success = self.success_requests.load(Ordering::Relaxed);
        let failed = self.failed_requests.load(Ordering::Relaxed);
        let bytes_total = self.total_bytes.load(Ordering::Relaxed);

        let global_latency = hist_to_stats(&self.latency_hist.lock());
        let global_ttfb = hist_to_stats(&self.ttfb_hist.lock());

        let mut connection = ConnectionStats::default();
        let samples = self.conn_samples.load(Ordering::Relaxed);
        if samples > 0 {
            let avg_ms = |total_us: &AtomicU64| {
                total_us.load(Ordering::Relaxed) as f64 / samples as f64 / 1000.0
            };
            connection.avg_dns_ms = avg_ms(&self.dns_total_us);
            connection.avg_tcp_ms = avg_ms(&self.tcp_total_us);
            connection.avg_tls_ms = avg_ms(&self.tls_total_us);
        }

        let error_rate = if total > 0 {
            failed as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let availability = if total > 0 {
            success as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        let actual_rps = if elapsed > 0.0 {
            total as f64 / elapsed
        } else {
            0.0
        };
        let throughput_mbps = if elapsed > 0.0 {
            bytes_total as f64 / 1024.0 / 1024.0 / elapsed
        } else {
            0.0
        };

        let global = GlobalResult {
            throughput: ThroughputStats {
                total_requests: total,
                successful: success,
                failed,
                actual_rps,
                peak_rps: self.peak_rps.load(Ordering::Relaxed),
                bytes_transferred: bytes_total,
                throughput_mbps,
            },
            latency: global_latency,
            ttfb: global_ttfb,
            connection,
            errors: ErrorStats {
                rate: error_rate,
                by_status_code: self.status_codes.lock().clone(),
                by_type: self.error_types.lock().clone(),
            },
            availability,
        };

        let mut per_environment = HashMap::with_capacity(self.env_data.len());
        for entry in self.env_data.iter() {
            let env_key = entry.key().clone();
            let env = entry.value().lock();

            let env_error_rate = if env.total > 0 {
                env.failed as f64 / env.total as f64 * 100.0
            } else {
                0.0
            };

            per_environment.insert(
                env_key.clone(),
                EnvironmentResult {
                    environment_key: env_key,
                    throughput: ThroughputStats {
                        total_requests: env.total,
                        successful: env.success,
                        failed: env.failed,
                        actual_rps: if elapsed > 0.0 {
                            env.total as f64 / elapsed
                        } else {
                            0.0
                        },
                        peak_rps: 0,
                        bytes_transferred: env.bytes_recv,
                        throughput_mbps: if elapsed > 0.0 {
                            env.bytes_recv as f64 / 1024.0 / 1024.0 / elapsed
                        } else {
                            0.0
                        },
                    },
                    latency: hist_to_stats(&env.latency_hist),
                    ttfb: hist_to_stats(&env.ttfb_hist),
                    errors: ErrorStats {
                        rate: env_error_rate,
                        by_status_code: env.status_codes.clone(),
                        by_type: env.error_types.clone(),
                    },
                },
            );
        }

        self.time_series.flush();

        TestResult {
            metadata: Default::default(),
            global,
            per_environment,
            time_series: self.time_series.points(),
        }
    }
}
