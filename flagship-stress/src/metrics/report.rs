//! Report shapes for the persisted JSON artifact.

use super::timeseries::TimeSeriesPoint;
use chrono::{DateTime, Utc};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Latency percentiles and statistics, in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyStats {
    #[serde(rename = "minMs")]
    pub min: f64,
    #[serde(rename = "maxMs")]
    pub max: f64,
    #[serde(rename = "meanMs")]
    pub mean: f64,
    #[serde(rename = "stdDevMs")]
    pub std_dev: f64,
    #[serde(rename = "p50Ms")]
    pub p50: f64,
    #[serde(rename = "p75Ms")]
    pub p75: f64,
    #[serde(rename = "p90Ms")]
    pub p90: f64,
    #[serde(rename = "p95Ms")]
    pub p95: f64,
    #[serde(rename = "p99Ms")]
    pub p99: f64,
    #[serde(rename = "p999Ms")]
    pub p999: f64,
    #[serde(rename = "p9999Ms")]
    pub p9999: f64,
}

/// Throughput metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThroughputStats {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    pub actual_rps: f64,
    pub peak_rps: u32,
    pub bytes_transferred: u64,
    #[serde(rename = "throughputMBps")]
    pub throughput_mbps: f64,
}

/// Connection timings averaged over the samples where a handshake was
/// observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionStats {
    #[serde(rename = "avgDnsMs")]
    pub avg_dns_ms: f64,
    #[serde(rename = "avgTcpMs")]
    pub avg_tcp_ms: f64,
    #[serde(rename = "avgTlsMs")]
    pub avg_tls_ms: f64,
}

/// Error breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStats {
    #[serde(rename = "ratePercent")]
    pub rate: f64,
    #[serde(rename = "byStatusCode")]
    pub by_status_code: HashMap<u16, u64>,
    #[serde(rename = "byType")]
    pub by_type: HashMap<String, u64>,
}

/// Metrics for a single environment, mirroring the global shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentResult {
    pub environment_key: String,
    pub throughput: ThroughputStats,
    pub latency: LatencyStats,
    pub ttfb: LatencyStats,
    pub errors: ErrorStats,
}

/// Aggregate metrics across all environments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalResult {
    pub throughput: ThroughputStats,
    pub latency: LatencyStats,
    pub ttfb: LatencyStats,
    pub connection: ConnectionStats,
    pub errors: ErrorStats,
    #[serde(rename = "availabilityPercent")]
    pub availability: f64,
}

/// Test configuration recorded alongside the results.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestMetadata {
    pub mode: String,
    pub duration: String,
    pub concurrency: usize,
    pub target_rps: u32,
    pub eval_url: String,
    pub admin_url: String,
    pub timestamp: Option<DateTime<Utc>>,
    pub harness_version: String,
    pub discovered_environments: Vec<String>,
    pub discovered_flags: Vec<String>,
    pub user_pool_size: usize,
    pub endpoint: String,
}

/// The complete results of a stress test.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResult {
    pub metadata: TestMetadata,
    pub global: GlobalResult,
    pub per_environment: HashMap<String, EnvironmentResult>,
    pub time_series: Vec<TimeSeriesPoint>,
}

/// Reduce a histogram of microsecond values to millisecond stats.
pub(crate) fn hist_to_stats(h: &Histogram<u64>) -> LatencyStats {
    if h.is_empty() {
        return LatencyStats::default();
    }
    LatencyStats {
        min: h.min() as f64 / 1000.0,
        max: h.max() as f64 / 1000.0,
        mean: h.mean() / 1000.0,
        std_dev: h.stdev() / 1000.0,
        p50: h.value_at_quantile(0.50) as f64 / 1000.0,
        p75: h.value_at_quantile(0.75) as f64 / 1000.0,
        p90: h.value_at_quantile(0.90) as f64 / 1000.0,
        p95: h.value_at_quantile(0.95) as f64 / 1000.0,
        p99: h.value_at_quantile(0.99) as f64 / 1000.0,
        p999: h.value_at_quantile(0.999) as f64 / 1000.0,
        p9999: h.value_at_quantile(0.9999) as f64 / 1000.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_yields_zeroed_stats() {
        let h = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
        let stats = hist_to_stats(&h);
        assert_eq!(stats.min, 0.0);
        assert_eq!(stats.p99, 0.0);
    }

    #[test]
    fn stats_convert_microseconds_to_milliseconds() {
        let mut h = Histogram::<u64>::new_with_bounds(1, 60_000_000, 3).unwrap();
        for v in [1_000u64, 2_000, 3_000, 4_000] {
            h.record(v).unwrap();
        }
        let stats = hist_to_stats(&h);
        assert!(stats.min >= 0.9 && stats.min <= 1.1, "min={}", stats.min);
        assert!(stats.max >= 3.9 && stats.max <= 4.1, "max={}", stats.max);
        assert!(stats.mean >= 2.4 && stats.mean <= 2.6, "mean={}", stats.mean);
    }

    #[test]
    fn report_serializes_with_wire_names() {
        let result = TestResult {
            metadata: TestMetadata {
                mode: "constant".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };
        let json = serde_json::to_value(&result).unwrap();
        assert!(json.get("metadata").is_some());
        assert!(json.get("global").is_some());
        assert!(json.get("perEnvironment").is_some());
        assert!(json.get("timeSeries").is_some());
        assert!(json["global"].get("availabilityPercent").is_some());
        assert!(json["global"]["latency"].get("p99Ms").is_some());
        assert!(json["global"]["throughput"].get("throughputMBps").is_some());
    }
}
