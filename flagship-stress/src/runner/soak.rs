use super::Runner;
use tokio::sync::watch;
use tokio::time::Instant;

impl Runner {
    /// Steady-state test at the soak RPS. Meant for long runs (minutes to
    /// hours) to surface leaks, pool exhaustion, and latency drift.
    pub(super) async fn run_soak(&self, deadline: Instant, shutdown: &mut watch::Receiver<bool>) {
        self.execute_fixed(&self.collector, self.cfg.soak_rps, deadline, shutdown)
            .await;
    }
}
