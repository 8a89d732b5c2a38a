// Pass Scheduler - runs reconciliation passes on a fixed interval
//
// - First pass runs immediately on start
// - A slow pass delays the next tick instead of piling up
// - Failures are logged; the next tick retries unsettled jobs

use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

use super::reconciler::{PassOptions, Reconciler};

pub struct PassScheduler {
    reconciler: Reconciler,
    every: Duration,
}

impl PassScheduler {
    pub fn new(reconciler: Reconciler, every: Duration) -> Self {
        Self { reconciler, every }
    }

    /// Start the scheduler (runs in background)
    pub fn start(self) -> JoinHandle<()> {
        info!("⏰ Reconciliation scheduled every {}s", self.every.as_secs());

        tokio::spawn(async move {
            let mut ticker = interval(self.every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                info!("🔄 Starting scheduled reconciliation pass");

                match self.reconciler.run_pass(PassOptions::default()).await {
                    Ok(report) => info!(
                        "✓ Scheduled pass {} completed ({} job(s), {} settled)",
                        report.pass_id,
                        report.outcomes.len(),
                        report.settled_count()
                    ),
                    Err(e) => error!("❌ Scheduled pass failed: {}", e),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::Pub;
    use crate::settlement::reconciler::ReconcilerSettings;
    use crate::settlement::testing::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_scheduler_runs_on_interval() {
        let status = Arc::new(FakeStatusProvider::new().with_deals(cid("cidC"), vec![queued(5)]));
        let reconciler = Reconciler::new(
            Arc::new(FakeJobStore::new(vec![job("cidC", Pub::new("ns1", "rel1"))])),
            status.clone(),
            Arc::new(FakeLedger::new(0)),
            ReconcilerSettings::default(),
        );

        let handle = PassScheduler::new(reconciler.clone(), Duration::from_secs(60)).start();

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(status.calls(), 2);
        assert!(reconciler.last_report().is_some());

        handle.abort();
    }
}
