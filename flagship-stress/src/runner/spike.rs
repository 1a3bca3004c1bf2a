use super::Runner;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

impl Runner {
    /// Baseline RPS with a single peak window centered at the midpoint of
    /// the test, lasting `spike-dur`.
    pub(super) async fn run_spike(&self, deadline: Instant, shutdown: &mut watch::Receiver<bool>) {
        let base_rps = self.cfg.spike_base_rps;
        let peak_rps = self.cfg.spike_peak_rps;
        let spike_duration = self.cfg.spike_duration;
        let total_duration = self.cfg.duration;

        let spike_start = (total_duration - spike_duration) / 2;
        let spike_end = spike_start + spike_duration;

        let current_rps = Arc::new(AtomicU32::new(base_rps));
        let started = std::time::Instant::now();

        let controller = {
            let current_rps = current_rps.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_millis(100));
                loop {
                    ticker.tick().await;
                    let elapsed = started.elapsed();
                    let rps = if elapsed >= spike_start && elapsed < spike_end {
                        peak_rps
                    } else {
                        base_rps
                    };
                    current_rps.store(rps, Ordering::Relaxed);
                }
            })
        };

        self.execute_dynamic(&self.collector, current_rps, deadline, shutdown)
            .await;

        controller.abort();
    }
}
