//! Streaming metrics aggregation for the stress harness.

pub mod collector;
pub mod report;
pub mod timeseries;

pub use collector::Collector;
pub use report::{
    ConnectionStats, EnvironmentResult, ErrorStats, GlobalResult, LatencyStats, TestMetadata,
    TestResult, ThroughputStats,
};
pub use timeseries::{TimeSeriesCollector, TimeSeriesPoint};
