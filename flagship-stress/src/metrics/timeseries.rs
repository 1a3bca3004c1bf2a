//! Per-second time series.
//!
//! Each second's latencies are buffered; on boundary crossing the closed
//! bucket is reduced to one point via nearest-rank quantiles on the
//! sorted vector.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// A per-second snapshot of test metrics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub second: u64,
    pub timestamp: Option<DateTime<Utc>>,
    pub rps: f64,
    #[serde(rename = "p50_latency_ms")]
    pub p50_latency: f64,
    #[serde(rename = "p99_latency_ms")]
    pub p99_latency: f64,
    #[serde(rename = "mean_latency_ms")]
    pub mean_latency: f64,
    pub errors: u64,
    pub in_flight: i64,
    pub bytes_recv: u64,
}

#[derive(Default)]
struct SecondBucket {
    latencies: Vec<f64>,
    errors: u64,
    requests: u64,
    bytes: u64,
    in_flight: i64,
}

struct Inner {
    start: Instant,
    start_wall: DateTime<Utc>,
    current: SecondBucket,
    current_sec: u64,
    points: Vec<TimeSeriesPoint>,
    latest: TimeSeriesPoint,
}

/// Accumulates per-second buckets and flushes them on boundary crossing.
pub struct TimeSeriesCollector {
    inner: Mutex<Inner>,
}

impl Default for TimeSeriesCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSeriesCollector {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                start: Instant::now(),
                start_wall: Utc::now(),
                current: SecondBucket::default(),
                current_sec: 0,
                points: Vec::new(),
                latest: TimeSeriesPoint::default(),
            }),
        }
    }

    /// Re-zero the clock. Called when the measured phase begins so
    /// warm-up time does not shift the series.
    pub fn reset_start(&self) {
        let mut inner = self.inner.lock();
        inner.start = Instant::now();
        inner.start_wall = Utc::now();
        inner.current = SecondBucket::default();
        inner.current_sec = 0;
    }

    /// Add a single request observation to the current second's bucket.
    pub fn record(&self, latency_ms: f64, is_error: bool, bytes_recv: u64, in_flight: i64) {
        let mut inner = self.inner.lock();

        let sec = inner.start.elapsed().as_secs();
        if sec != inner.current_sec {
            if inner.current.requests > 0 {
                flush_locked(&mut inner);
            }
            // Track the wall clock even across idle seconds, so the next
            // point's second/timestamp index stays aligned.
            inner.current_sec = sec;
        }

        inner.current.latencies.push(latency_ms);
        inner.current.requests += 1;
        inner.current.bytes += bytes_recv;
        inner.current.in_flight = in_flight;
        if is_error {
            inner.current.errors += 1;
        }
    }

    /// Force the current bucket into a point.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        if inner.current.requests > 0 {
            flush_locked(&mut inner);
        }
    }

    /// The most recently flushed point.
    pub fn latest(&self) -> TimeSeriesPoint {
        self.inner.lock().latest.clone()
    }

    /// All flushed points so far.
    pub fn points(&self) -> Vec<TimeSeriesPoint> {
        self.inner.lock().points.clone()
    }
}

fn flush_locked(inner: &mut Inner) {
    let bucket = std::mem::take(&mut inner.current);

    let mut point = TimeSeriesPoint {
        second: inner.current_sec,
        timestamp: Some(inner.start_wall + chrono::Duration::seconds(inner.current_sec as i64)),
        rps: bucket.requests as f64,
        errors: bucket.errors,
        in_flight: bucket.in_flight,
        bytes_recv: bucket.bytes,
        ..Default::default()
    };

    if !bucket.latencies.is_empty() {
        let mut sorted = bucket.latencies;
        sorted.sort_by(|a, b| a.total_cmp(b));

        point.p50_latency = percentile(&sorted, 50.0);
        point.p99_latency = percentile(&sorted, 99.0);
        point.mean_latency = sorted.iter().sum::<f64>() / sorted.len() as f64;
    }

    inner.points.push(point.clone());
    inner.latest = point;
}

/// Nearest-rank index into an already-sorted latency vector.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * pct / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentile_uses_nearest_rank() {
        let sorted: Vec<f64> = (1..=100).map(|v| v as f64).collect();
        assert_eq!(percentile(&sorted, 50.0), 50.0);
        assert_eq!(percentile(&sorted, 99.0), 99.0);
        assert_eq!(percentile(&sorted, 100.0), 100.0);
        assert_eq!(percentile(&[42.0], 99.0), 42.0);
        assert_eq!(percentile(&[], 50.0), 0.0);
    }

    #[test]
    fn flush_reduces_the_current_bucket() {
        let ts = TimeSeriesCollector::new();
        ts.record(10.0, false, 100, 3);
        ts.record(20.0, true, 100, 3);
        ts.record(30.0, false, 100, 3);
        ts.flush();

        let points = ts.points();
        assert_eq!(points.len(), 1);
        let point = &points[0];
        assert_eq!(point.rps, 3.0);
        assert_eq!(point.errors, 1);
        assert_eq!(point.bytes_recv, 300);
        assert_eq!(point.in_flight, 3);
        assert_eq!(point.p50_latency, 20.0);
        assert_eq!(point.p99_latency, 30.0);
        assert!((point.mean_latency - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn empty_bucket_is_not_flushed() {
        let ts = TimeSeriesCollector::new();
        ts.flush();
        assert!(ts.points().is_empty());
    }

    #[test]
    fn latest_tracks_the_last_flushed_point() {
        let ts = TimeSeriesCollector::new();
        ts.record(5.0, false, 10, 1);
        ts.flush();
        assert_eq!(ts.latest().rps, 1.0);
    }

    #[test]
    fn idle_leading_second_does_not_mislabel_the_first_point() {
        let ts = TimeSeriesCollector::new();
        ts.reset_start();

        // No traffic during second 0.
        std::thread::sleep(std::time::Duration::from_millis(1050));
        ts.record(5.0, false, 10, 1);
        ts.flush();

        let points = ts.points();
        assert_eq!(points.len(), 1);
        assert!(points[0].second >= 1, "second={}", points[0].second);
    }
}
