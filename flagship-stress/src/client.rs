//! Instrumented HTTP client for the evaluation API.

use anyhow::{anyhow, Context, Result};
use std::time::{Duration, Instant};
use tokio::net::{lookup_host, TcpStream};

/// Timing and status information for a single request.
#[derive(Debug, Clone, Default)]
pub struct RequestResult {
    pub status_code: Option<u16>,
    pub latency: Duration,
    /// Time to the first response byte; absent when the request never
    /// produced a response.
    pub ttfb: Option<Duration>,
    /// Connection-establishment timings, present only when a handshake
    /// was actually observed (pooled requests reuse connections).
    pub dns_lookup: Option<Duration>,
    pub tcp_connect: Option<Duration>,
    pub tls_handshake: Option<Duration>,
    pub bytes_received: u64,
    pub error: Option<String>,
    pub error_type: Option<String>,
    pub environment: String,
    pub is_bulk: bool,
}

impl RequestResult {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// One evaluation API target to stress.
#[derive(Debug, Clone)]
pub struct TestTarget {
    pub environment_key: String,
    pub api_key: String,
    pub flag_key: String,
    pub is_bulk: bool,
}

/// A DNS + TCP (+ TLS) handshake measurement from the pre-flight probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectionSample {
    pub dns: Option<Duration>,
    pub tcp: Option<Duration>,
    pub tls: Option<Duration>,
}

/// HTTP client tuned for stress testing the evaluation API.
pub struct EvalClient {
    http: reqwest::Client,
    base_url: String,
}

impl EvalClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration, max_idle_conns: usize) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(max_idle_conns)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .context("failed to build evaluation HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Execute one request and return detailed timing metrics. Never
    /// fails: errors are classified into the result.
    pub async fn execute(&self, target: &TestTarget, user_id: &str) -> RequestResult {
        let mut result = RequestResult {
            environment: target.environment_key.clone(),
            is_bulk: target.is_bulk,
            ..Default::default()
        };

        let mut url = if target.is_bulk {
            format!("{}/evaluate", self.base_url)
        } else {
            format!("{}/evaluate/{}", self.base_url, target.flag_key)
        };
        if !user_id.is_empty() {
            url.push_str("?user=");
            url.push_str(user_id);
        }

        let start = Instant::now();

        let response = self
            .http
            .get(&url)
            .header("X-API-Key", &target.api_key)
            .header("Accept", "application/json")
            .send()
            .await;

        let mut response = match response {
            Ok(response) => response,
            Err(err) => {
                result.latency = start.elapsed();
                result.error_type = Some(classify_error(&err));
                result.error = Some(err.to_string());
                return result;
            }
        };

        // Headers parsed means the first response bytes have arrived.
        result.ttfb = Some(start.elapsed());
        let status = response.status();
        result.status_code = Some(status.as_u16());
        let header_bytes = estimate_header_size(response.headers());

        // Read and discard the body to measure the full transfer and let
        // the connection return to the pool.
        let mut body_bytes: u64 = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => body_bytes += chunk.len() as u64,
                Ok(None) => break,
                Err(err) => {
                    result.latency = start.elapsed();
                    result.error_type = Some(classify_error(&err));
                    result.error = Some(err.to_string());
                    return result;
                }
            }
        }

        result.latency = start.elapsed();
        result.bytes_received = body_bytes + header_bytes;

        if status.as_u16() >= 400 {
            result.error = Some(format!("HTTP {}", status.as_u16()));
            result.error_type = Some(format!("http_{}", status.as_u16()));
        }

        result
    }

    /// Verify the evaluation API is ready to accept traffic.
    pub async fn check_ready(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/ready", self.base_url))
            .send()
            .await
            .with_context(|| format!("evaluation API not reachable at {}", self.base_url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("evaluation API not ready (HTTP {status}): {body}"));
        }
        Ok(())
    }

    /// Measure DNS resolution and TCP connect for the target host.
    ///
    /// Steady-state requests ride pooled connections and never observe a
    /// handshake, so the probe is where connection timings come from.
    /// TLS handshake timing is left unset for plain-HTTP targets.
    pub async fn probe_connection(&self) -> Result<ConnectionSample> {
        let url = reqwest::Url::parse(&self.base_url).context("invalid eval URL")?;
        let host = url.host_str().context("eval URL has no host")?;
        let port = url
            .port_or_known_default()
            .context("eval URL has no port")?;

        let mut sample = ConnectionSample::default();

        let dns_start = Instant::now();
        let mut addrs = lookup_host((host, port))
            .await
            .with_context(|| format!("DNS lookup failed for {host}"))?;
        sample.dns = Some(dns_start.elapsed());

        let addr = addrs.next().context("DNS returned no addresses")?;
        let tcp_start = Instant::now();
        let _stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("TCP connect failed for {addr}"))?;
        sample.tcp = Some(tcp_start.elapsed());

        Ok(sample)
    }
}

/// Classify a transport-level failure. Connect failures are checked
/// before the generic request predicate, which is also true for them;
/// only construction-time failures count as `request_creation`.
fn classify_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "timeout".to_string()
    } else if err.is_connect() {
        "network".to_string()
    } else if err.is_builder() || err.is_request() {
        "request_creation".to_string()
    } else {
        "unknown".to_string()
    }
}

/// Estimate header bytes on the wire: name + value + separators per
/// header line.
fn estimate_header_size(headers: &reqwest::header::HeaderMap) -> u64 {
    headers
        .iter()
        .map(|(name, value)| (name.as_str().len() + value.as_bytes().len() + 4) as u64)
        .sum()
}
