use super::Runner;
use tokio::sync::watch;
use tokio::time::Instant;

impl Runner {
    /// Constant-rate test at the configured target RPS.
    pub(super) async fn run_constant(
        &self,
        deadline: Instant,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        self.execute_fixed(&self.collector, self.cfg.target_rps, deadline, shutdown)
            .await;
    }
}
