//! Stress harness entrypoint: discover targets, drive the evaluation
//! API at the configured profile, and export the metrics report.

mod admin;
mod client;
mod config;
mod exporter;
mod metrics;
mod runner;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use admin::{filter_environments, filter_flags, AdminClient};
use client::EvalClient;
use config::Config;
use metrics::TestMetadata;
use runner::{build_targets, Runner};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run().await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "stress test failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let cfg = Config::parse();
    cfg.validate().map_err(|msg| anyhow!(msg))?;

    // ── Admin discovery ─────────────────────────────────────────
    let admin_client = AdminClient::new(&cfg.admin_url, &cfg.admin_token)?;

    info!(url = %cfg.admin_url, "discovering environments and flags");
    let discovery = admin_client.discover().await?;
    info!(
        environments = discovery.environments.len(),
        flags = discovery.flags.len(),
        "discovery complete"
    );

    let envs = filter_environments(discovery.environments, &cfg.env_filter);
    let flags = filter_flags(discovery.flags, &cfg.flag_filter);

    if envs.is_empty() {
        return Err(anyhow!("no environments matched the filter"));
    }
    if flags.is_empty() {
        return Err(anyhow!("no flags matched the filter"));
    }

    let env_keys: Vec<String> = envs.iter().map(|e| e.key.clone()).collect();
    let flag_keys: Vec<String> = flags.iter().map(|f| f.key.clone()).collect();

    // ── Build targets ───────────────────────────────────────────
    let targets = build_targets(&envs, &flag_keys, cfg.endpoint);
    info!(targets = targets.len(), "built target list");
    if targets.is_empty() {
        return Err(anyhow!("no targets to test"));
    }

    // ── Pre-flight ──────────────────────────────────────────────
    let eval_client = Arc::new(EvalClient::new(
        &cfg.eval_url,
        cfg.http_timeout,
        cfg.max_idle_conns,
    )?);

    tokio::time::timeout(Duration::from_secs(10), eval_client.check_ready())
        .await
        .context("readiness check timed out")??;
    info!(url = %cfg.eval_url, "evaluation API is ready");

    // ── Run ─────────────────────────────────────────────────────
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("interrupt received, stopping gracefully");
                let _ = shutdown_tx.send(true);
            }
            // Keep the sender alive; dropping it would read as shutdown.
            Err(_) => std::future::pending::<()>().await,
        }
    });

    let runner = Runner::new(cfg.clone(), eval_client.clone(), targets);

    // Steady-state requests reuse pooled connections, so handshake
    // timings come from an explicit probe.
    match eval_client.probe_connection().await {
        Ok(sample) => runner.collector().record_connection(&sample),
        Err(err) => warn!(error = %err, "connection probe failed"),
    }

    info!(
        mode = cfg.mode.as_str(),
        duration_s = cfg.duration.as_secs(),
        concurrency = cfg.concurrency,
        rps = cfg.mode_rps(),
        endpoint = cfg.endpoint.as_str(),
        "starting stress test"
    );

    let mut result = runner.run(shutdown_rx).await;

    // ── Metadata ────────────────────────────────────────────────
    result.metadata = TestMetadata {
        mode: cfg.mode.as_str().to_string(),
        duration: format!("{:?}", cfg.duration),
        concurrency: cfg.concurrency,
        target_rps: cfg.mode_rps(),
        eval_url: cfg.eval_url.clone(),
        admin_url: cfg.admin_url.clone(),
        timestamp: Some(chrono::Utc::now()),
        harness_version: env!("CARGO_PKG_VERSION").to_string(),
        discovered_environments: env_keys,
        discovered_flags: flag_keys,
        user_pool_size: cfg.user_pool_size,
        endpoint: cfg.endpoint.as_str().to_string(),
    };

    // ── Summary & export ────────────────────────────────────────
    let g = &result.global;
    info!(
        total = g.throughput.total_requests,
        rps = format!("{:.1}", g.throughput.actual_rps),
        peak_rps = g.throughput.peak_rps,
        p50_ms = format!("{:.2}", g.latency.p50),
        p99_ms = format!("{:.2}", g.latency.p99),
        availability = format!("{:.2}%", g.availability),
        error_rate = format!("{:.2}%", g.errors.rate),
        "test complete"
    );

    exporter::export(&result, Path::new(&cfg.output_dir), cfg.mode.as_str())?;
    info!(dir = %cfg.output_dir, "results exported");

    // ── Exit code ───────────────────────────────────────────────
    if result.global.errors.rate > cfg.error_threshold {
        error!(
            rate = format!("{:.2}%", result.global.errors.rate),
            threshold = format!("{:.2}%", cfg.error_threshold),
            "error rate exceeds threshold"
        );
        return Ok(ExitCode::FAILURE);
    }

    info!("stress test completed successfully");
    Ok(ExitCode::SUCCESS)
}
