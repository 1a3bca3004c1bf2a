//! Test orchestration: worker pool, rate gates, and mode dispatch.

mod constant;
mod rampup;
mod soak;
mod spike;

use crate::admin::AdminEnvironment;
use crate::client::{EvalClient, TestTarget};
use crate::config::{Config, Endpoint, Mode};
use crate::metrics::Collector;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::info;

/// Orchestrates the stress test across all modes.
pub struct Runner {
    cfg: Config,
    client: Arc<EvalClient>,
    collector: Arc<Collector>,
    targets: Arc<Vec<TestTarget>>,
    user_ids: Arc<Vec<String>>,
}

impl Runner {
    pub fn new(cfg: Config, client: Arc<EvalClient>, targets: Vec<TestTarget>) -> Self {
        let user_ids = (0..cfg.user_pool_size)
            .map(|i| format!("{}{}", cfg.user_id_prefix, i))
            .collect();

        Self {
            cfg,
            client,
            collector: Arc::new(Collector::new()),
            targets: Arc::new(targets),
            user_ids: Arc::new(user_ids),
        }
    }

    /// The main collector; pre-flight probes feed it directly.
    pub fn collector(&self) -> Arc<Collector> {
        self.collector.clone()
    }

    /// Execute the stress test according to the configured mode. Returns
    /// only after all in-flight requests have drained.
    pub async fn run(
        &self,
        mut shutdown: watch::Receiver<bool>,
    ) -> crate::metrics::TestResult {
        // Warm-up phase with a throwaway collector.
        if self.cfg.warm_up > Duration::ZERO && !*shutdown.borrow() {
            info!(duration_s = self.cfg.warm_up.as_secs(), "warming up");
            let warmup_collector = Arc::new(Collector::new());
            warmup_collector.start();
            let warmup_deadline = Instant::now() + self.cfg.warm_up;
            self.execute_fixed(
                &warmup_collector,
                self.cfg.mode_rps(),
                warmup_deadline,
                &mut shutdown,
            )
            .await;
            let _ = warmup_collector.result();
            info!("warm-up complete, starting test");
        }

        self.collector.start();
        let deadline = Instant::now() + self.cfg.duration;

        let progress = tokio::spawn(report_progress(
            self.collector.clone(),
            self.cfg.duration.as_secs_f64(),
            count_unique_envs(&self.targets),
        ));

        match self.cfg.mode {
            Mode::Constant => self.run_constant(deadline, &mut shutdown).await,
            Mode::Rampup => self.run_ramp_up(deadline, &mut shutdown).await,
            Mode::Spike => self.run_spike(deadline, &mut shutdown).await,
            Mode::Soak => self.run_soak(deadline, &mut shutdown).await,
        }

        progress.abort();
        self.collector.result()
    }

    /// Fixed-tick dispatch: one enqueue attempt per `1s / targetRPS`
    /// tick; when the worker pool is saturated the tick is dropped, not
    /// queued.
    pub(crate) async fn execute_fixed(
        &self,
        collector: &Arc<Collector>,
        target_rps: u32,
        deadline: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let sem = Arc::new(Semaphore::new(self.cfg.concurrency));
        let mut workers = JoinSet::new();

        let mut interval =
            tokio::time::interval(Duration::from_secs_f64(1.0 / target_rps.max(1) as f64));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = shutdown.changed() => break,
                _ = interval.tick() => {
                    self.dispatch(collector, &sem, &mut workers);
                }
                // Reap finished workers so long tests stay flat on memory.
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }

        drain(&mut workers).await;
    }

    /// Token-bucket dispatch for dynamically changing RPS: a 1ms driver
    /// accumulates `currentRPS × elapsed` tokens and attempts one enqueue
    /// per whole token; saturated enqueues are dropped.
    pub(crate) async fn execute_dynamic(
        &self,
        collector: &Arc<Collector>,
        current_rps: Arc<AtomicU32>,
        deadline: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let sem = Arc::new(Semaphore::new(self.cfg.concurrency));
        let mut workers = JoinSet::new();

        let mut driver = tokio::time::interval(Duration::from_millis(1));
        driver.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        let mut tokens: f64 = 0.0;
        let mut last_tick = Instant::now();

        loop {
            tokio::select! {
                _ = &mut sleep => break,
                _ = shutdown.changed() => break,
                now = driver.tick() => {
                    let elapsed = now.duration_since(last_tick).as_secs_f64();
                    last_tick = now;

                    tokens += current_rps.load(Ordering::Relaxed) as f64 * elapsed;
                    while tokens >= 1.0 {
                        tokens -= 1.0;
                        self.dispatch(collector, &sem, &mut workers);
                    }
                }
                Some(_) = workers.join_next(), if !workers.is_empty() => {}
            }
        }

        drain(&mut workers).await;
    }

    /// Try to hand one request to the worker pool. Saturation drops the
    /// attempt; that is the backpressure signal for an overloaded target.
    fn dispatch(
        &self,
        collector: &Arc<Collector>,
        sem: &Arc<Semaphore>,
        workers: &mut JoinSet<()>,
    ) {
        let Ok(permit) = sem.clone().try_acquire_owned() else {
            return;
        };

        let client = self.client.clone();
        let collector = collector.clone();
        let target = self.random_target();
        let user_id = self.random_user_id();

        workers.spawn(async move {
            collector.in_flight_inc();
            let result = client.execute(&target, &user_id).await;
            collector.in_flight_dec();
            collector.record(&result);
            drop(permit);
        });
    }

    fn random_target(&self) -> TestTarget {
        let idx = rand::thread_rng().gen_range(0..self.targets.len());
        self.targets[idx].clone()
    }

    fn random_user_id(&self) -> String {
        let idx = rand::thread_rng().gen_range(0..self.user_ids.len());
        self.user_ids[idx].clone()
    }
}

/// Wait for every outstanding worker to finish.
async fn drain(workers: &mut JoinSet<()>) {
    while workers.join_next().await.is_some() {}
}

async fn report_progress(collector: Arc<Collector>, total_secs: f64, env_count: usize) {
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let (total, _, failed, rps, in_flight) = collector.snapshot();
        let latest = collector.time_series.latest();
        info!(
            elapsed_s = started.elapsed().as_secs(),
            total_s = total_secs as u64,
            requests = total,
            rps = format!("{rps:.0}"),
            p99_ms = format!("{:.1}", latest.p99_latency),
            failed,
            envs = env_count,
            in_flight,
            "progress"
        );
    }
}

fn count_unique_envs(targets: &[TestTarget]) -> usize {
    let mut seen = std::collections::HashSet::new();
    for target in targets {
        seen.insert(target.environment_key.as_str());
    }
    seen.len()
}

/// Build test targets from discovered environments and flags: bulk is one
/// per environment, single is one per (environment, flag).
pub fn build_targets(
    envs: &[AdminEnvironment],
    flag_keys: &[String],
    endpoint: Endpoint,
) -> Vec<TestTarget> {
    let mut targets = Vec::new();

    for env in envs {
        if matches!(endpoint, Endpoint::Bulk | Endpoint::Both) {
            targets.push(TestTarget {
                environment_key: env.key.clone(),
                api_key: env.api_key.clone(),
                flag_key: String::new(),
                is_bulk: true,
            });
        }
        if matches!(endpoint, Endpoint::Single | Endpoint::Both) {
            for flag_key in flag_keys {
                targets.push(TestTarget {
                    environment_key: env.key.clone(),
                    api_key: env.api_key.clone(),
                    flag_key: flag_key.clone(),
                    is_bulk: false,
                });
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn env(key: &str) -> AdminEnvironment {
        AdminEnvironment {
            id: key.to_string(),
            key: key.to_string(),
            name: key.to_string(),
            is_active: true,
            api_key: format!("sk-{key}"),
        }
    }

    fn test_config(args: &[&str]) -> Config {
        let mut full = vec!["flagship-stress", "--admin-token", "tok"];
        full.extend_from_slice(args);
        Config::parse_from(full)
    }

    #[test]
    fn targets_cover_envs_and_flags() {
        let envs = vec![env("prod"), env("staging")];
        let flags = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let bulk = build_targets(&envs, &flags, Endpoint::Bulk);
        assert_eq!(bulk.len(), 2);
        assert!(bulk.iter().all(|t| t.is_bulk));

        let single = build_targets(&envs, &flags, Endpoint::Single);
        assert_eq!(single.len(), 6);
        assert!(single.iter().all(|t| !t.is_bulk));

        let both = build_targets(&envs, &flags, Endpoint::Both);
        assert_eq!(both.len(), 8);
    }

    #[test]
    fn unique_env_count() {
        let envs = vec![env("prod"), env("staging")];
        let flags = vec!["a".to_string()];
        let targets = build_targets(&envs, &flags, Endpoint::Both);
        assert_eq!(count_unique_envs(&targets), 2);
    }

    #[tokio::test]
    async fn user_pool_has_stable_names() {
        let cfg = test_config(&["--users", "3", "--user-prefix", "u-"]);
        let client = Arc::new(EvalClient::new("http://127.0.0.1:9", Duration::from_millis(100), 4).unwrap());
        let runner = Runner::new(cfg, client, vec![]);
        assert_eq!(
            runner.user_ids.as_slice(),
            ["u-0".to_string(), "u-1".to_string(), "u-2".to_string()]
        );
    }

    #[tokio::test]
    async fn fixed_tick_respects_the_rate_gate_bound() {
        // Against an unreachable target every request fails fast, so over
        // a window W the recorded count is bounded by targetRPS * W plus
        // the semaphore headroom.
        let cfg = test_config(&["--rps", "200", "--concurrency", "10", "--warmup", "0s"]);
        let client = Arc::new(
            EvalClient::new("http://127.0.0.1:9", Duration::from_millis(200), 4).unwrap(),
        );
        let targets = build_targets(&[env("prod")], &["a".to_string()], Endpoint::Single);
        let runner = Runner::new(cfg, client, targets);

        let (_tx, mut rx) = watch::channel(false);
        let collector = runner.collector();
        collector.start();

        let deadline = Instant::now() + Duration::from_secs(1);
        runner
            .execute_fixed(&collector, 200, deadline, &mut rx)
            .await;

        let result = collector.result();
        let total = result.global.throughput.total_requests;
        assert!(total > 0, "no requests issued");
        assert!(
            total <= 200 + 10 + 20,
            "rate gate exceeded: {total} requests in 1s at 200 rps"
        );
    }

    #[tokio::test]
    async fn saturated_pool_drops_ticks_and_drains() {
        // A listener that never accepts keeps workers pending until their
        // timeout, so the pool saturates and excess ticks are dropped.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let cfg = test_config(&["--concurrency", "2", "--warmup", "0s"]);
        let client = Arc::new(
            EvalClient::new(format!("http://{addr}"), Duration::from_millis(200), 4).unwrap(),
        );
        let targets = build_targets(&[env("prod")], &["a".to_string()], Endpoint::Single);
        let runner = Runner::new(cfg, client, targets);

        let (_tx, mut rx) = watch::channel(false);
        let collector = runner.collector();
        collector.start();

        let deadline = Instant::now() + Duration::from_millis(500);
        runner
            .execute_fixed(&collector, 1000, deadline, &mut rx)
            .await;

        let result = collector.result();
        let total = result.global.throughput.total_requests;
        // Two workers, 200ms timeout, 500ms window plus drain: far fewer
        // completions than the 1000 rps tick rate offered.
        assert!(total >= 2, "workers never completed: {total}");
        assert!(total <= 10, "pool did not bound concurrency: {total}");
        assert!(result.global.errors.by_type.contains_key("timeout"));

        // Everything drained: the in-flight gauge is back to zero.
        let (_, _, _, _, in_flight) = collector.snapshot();
        assert_eq!(in_flight, 0);
        drop(listener);
    }

    #[tokio::test]
    async fn shutdown_signal_stops_dispatch() {
        let cfg = test_config(&["--concurrency", "4", "--warmup", "0s"]);
        let client = Arc::new(
            EvalClient::new("http://127.0.0.1:9", Duration::from_millis(100), 4).unwrap(),
        );
        let targets = build_targets(&[env("prod")], &["a".to_string()], Endpoint::Single);
        let runner = Runner::new(cfg, client, targets);

        let (tx, mut rx) = watch::channel(false);
        let collector = runner.collector();
        collector.start();

        let started = std::time::Instant::now();
        let deadline = Instant::now() + Duration::from_secs(30);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            let _ = tx.send(true);
        });
        runner.execute_fixed(&collector, 50, deadline, &mut rx).await;

        assert!(
            started.elapsed() < Duration::from_secs(5),
            "shutdown did not interrupt the dispatch loop"
        );
    }
}
