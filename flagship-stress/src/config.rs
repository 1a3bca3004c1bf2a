//! Command-line configuration for the stress harness.

use clap::{Parser, ValueEnum};
use flagship_core::duration::parse_duration;
use std::time::Duration;

/// Stress testing mode.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Fixed target RPS for the whole test
    Constant,
    /// Linear ramp from `--ramp-start` to `--ramp-end`
    Rampup,
    /// Baseline RPS with a peak window at the midpoint
    Spike,
    /// Steady RPS held for long durations to detect drift
    Soak,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Constant => "constant",
            Mode::Rampup => "rampup",
            Mode::Spike => "spike",
            Mode::Soak => "soak",
        }
    }
}

/// Which evaluation endpoint(s) to exercise.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    /// One target per (environment, flag) against `/evaluate/{flagKey}`
    Single,
    /// One target per environment against `/evaluate`
    Bulk,
    /// Both of the above
    Both,
}

impl Endpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Endpoint::Single => "single",
            Endpoint::Bulk => "bulk",
            Endpoint::Both => "both",
        }
    }
}

/// A stress testing tool for the Flagship Evaluation API.
///
/// Discovers environments and flags via the Admin API, then stress-tests
/// the Evaluation API at a prescribed request-per-second profile.
#[derive(Parser, Debug, Clone)]
#[command(name = "flagship-stress", version)]
pub struct Config {
    /// JWT token for the Admin API (required)
    #[arg(long)]
    pub admin_token: String,

    /// Admin API base URL
    #[arg(long, default_value = "http://localhost:8080")]
    pub admin_url: String,

    /// Evaluation API base URL
    #[arg(long, default_value = "http://localhost:8081")]
    pub eval_url: String,

    /// Environment keys to test (comma-separated, empty = all)
    #[arg(long = "envs", value_delimiter = ',')]
    pub env_filter: Vec<String>,

    /// Flag keys to test (comma-separated, empty = all)
    #[arg(long = "flags", value_delimiter = ',')]
    pub flag_filter: Vec<String>,

    /// Evaluation endpoint(s) to exercise
    #[arg(long, value_enum, default_value = "both")]
    pub endpoint: Endpoint,

    /// Test mode
    #[arg(long, value_enum, default_value = "constant")]
    pub mode: Mode,

    /// Test duration
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub duration: Duration,

    /// Number of concurrent workers
    #[arg(long, default_value_t = 50)]
    pub concurrency: usize,

    /// Target requests/sec (constant mode)
    #[arg(long = "rps", default_value_t = 1000)]
    pub target_rps: u32,

    /// Starting RPS (ramp-up mode)
    #[arg(long = "ramp-start", default_value_t = 100)]
    pub ramp_start_rps: u32,

    /// Ending RPS (ramp-up mode)
    #[arg(long = "ramp-end", default_value_t = 5000)]
    pub ramp_end_rps: u32,

    /// Duration per RPS step (ramp-up mode)
    #[arg(long = "ramp-step", default_value = "5s", value_parser = parse_duration)]
    pub ramp_step: Duration,

    /// Baseline RPS (spike mode)
    #[arg(long = "spike-base", default_value_t = 500)]
    pub spike_base_rps: u32,

    /// Peak RPS during the spike
    #[arg(long = "spike-peak", default_value_t = 5000)]
    pub spike_peak_rps: u32,

    /// Duration of the spike window
    #[arg(long = "spike-dur", default_value = "5s", value_parser = parse_duration)]
    pub spike_duration: Duration,

    /// Steady RPS for soak tests
    #[arg(long = "soak-rps", default_value_t = 500)]
    pub soak_rps: u32,

    /// Number of synthetic user IDs
    #[arg(long = "users", default_value_t = 1000)]
    pub user_pool_size: usize,

    /// Prefix for generated user IDs
    #[arg(long = "user-prefix", default_value = "user-")]
    pub user_id_prefix: String,

    /// Per-request HTTP timeout
    #[arg(long = "timeout", default_value = "10s", value_parser = parse_duration)]
    pub http_timeout: Duration,

    /// Warm-up period with results excluded (0s disables)
    #[arg(long = "warmup", default_value = "5s", value_parser = parse_duration)]
    pub warm_up: Duration,

    /// HTTP client max idle connections per host
    #[arg(long = "max-idle-conns", default_value_t = 200)]
    pub max_idle_conns: usize,

    /// Directory for JSON results (per-mode file, rotated to archive/)
    #[arg(long = "output", default_value = "results")]
    pub output_dir: String,

    /// Error rate threshold (%) above which the exit code is 1
    #[arg(long = "error-threshold", default_value_t = 5.0)]
    pub error_threshold: f64,
}

impl Config {
    /// Validate cross-flag constraints the derive layer cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.admin_token.is_empty() {
            return Err("--admin-token is required".to_string());
        }
        if self.concurrency < 1 {
            return Err("--concurrency must be >= 1".to_string());
        }
        if self.target_rps < 1 {
            return Err("--rps must be >= 1".to_string());
        }
        if self.duration < Duration::from_secs(1) {
            return Err("--duration must be >= 1s".to_string());
        }
        if self.user_pool_size < 1 {
            return Err("--users must be >= 1".to_string());
        }
        if self.mode == Mode::Rampup && self.ramp_end_rps < self.ramp_start_rps {
            return Err("--ramp-end must be >= --ramp-start".to_string());
        }
        if self.mode == Mode::Spike && self.spike_duration >= self.duration {
            return Err("--spike-dur must be shorter than --duration".to_string());
        }
        Ok(())
    }

    /// The RPS the configured mode starts at.
    pub fn mode_rps(&self) -> u32 {
        match self.mode {
            Mode::Rampup => self.ramp_start_rps,
            Mode::Spike => self.spike_base_rps,
            Mode::Soak => self.soak_rps,
            Mode::Constant => self.target_rps,
        }
    }
}
