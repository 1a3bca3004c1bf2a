use super::Runner;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::Instant;

impl Runner {
    /// Linear interpolation from `ramp-start` to `ramp-end` in
    /// `ramp-step` intervals, driven through the token-bucket dispatcher.
    pub(super) async fn run_ramp_up(
        &self,
        deadline: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        let start_rps = self.cfg.ramp_start_rps;
        let end_rps = self.cfg.ramp_end_rps;
        let step_duration = self.cfg.ramp_step;

        let total_steps =
            ((self.cfg.duration.as_secs_f64() / step_duration.as_secs_f64()) as u32).max(1);
        let increment = f64::from(end_rps - start_rps) / f64::from(total_steps);

        let current_rps = Arc::new(AtomicU32::new(start_rps));

        let updater = {
            let current_rps = current_rps.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(step_duration);
                ticker.tick().await;
                let mut step = 0u32;
                loop {
                    ticker.tick().await;
                    step += 1;
                    let next = start_rps + (f64::from(step) * increment) as u32;
                    current_rps.store(next.min(end_rps), Ordering::Relaxed);
                }
            })
        };

        self.execute_dynamic(&self.collector, current_rps, deadline, shutdown)
            .await;

        updater.abort();
    }
}
