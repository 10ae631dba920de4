use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use jobgrid_channel::SchedulerChannel;
use jobgrid_model::{StatusExchangeRequest, StatusExchangeResponse};

use crate::engine::WorkerEngine;
use crate::error::Result;

/// Pull-based reconciliation for one (group, type) pair.
///
/// Each poll tick snapshots the engine's local state, exchanges it with
/// the controller, and applies the returned diff. A failed exchange leaves
/// local state untouched until the next tick — convergence is eventual,
/// and the cadence is the retry policy.
pub struct ReconcileClient {
    engine: Arc<WorkerEngine>,
    channel: Arc<dyn SchedulerChannel>,
    cluster: String,
    group: String,
    job_type: String,
}

impl ReconcileClient {
    pub fn new(
        engine: Arc<WorkerEngine>,
        channel: Arc<dyn SchedulerChannel>,
        cluster: impl Into<String>,
        group: impl Into<String>,
        job_type: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            channel,
            cluster: cluster.into(),
            group: group.into(),
            job_type: job_type.into(),
        }
    }

    /// One full reconciliation cycle: snapshot, exchange, apply.
    pub async fn poll_once(&self) -> Result<()> {
        let state = self.engine.snapshot(&self.group, &self.job_type);

        let response = self
            .channel
            .status_exchange(StatusExchangeRequest {
                cluster: self.cluster.clone(),
                group: self.group.clone(),
                job_type: self.job_type.clone(),
                state,
            })
            .await?;

        self.apply(response);
        Ok(())
    }

    /// Apply an exchange result to the engine. Failures on individual jobs
    /// are logged and skipped so one bad definition cannot stall the rest
    /// of the diff.
    fn apply(&self, response: StatusExchangeResponse) {
        if response.is_empty() {
            debug!(group = %self.group, job_type = %self.job_type, "local schedule is in sync");
            return;
        }

        info!(
            group = %self.group,
            job_type = %self.job_type,
            added = response.added.len(),
            updated = response.updated.len(),
            removed = response.removed.len(),
            "applying exchange result"
        );

        for (code, definition) in &response.added {
            if let Err(e) = self.engine.schedule(definition) {
                warn!(code = %code, group = %self.group, error = %e, "could not schedule added job");
            }
        }

        for (code, definition) in &response.updated {
            if let Err(e) = self.engine.reschedule(definition) {
                warn!(code = %code, group = %self.group, error = %e, "could not reschedule updated job");
            }
        }

        for code in &response.removed {
            if let Err(e) = self.engine.unschedule(code, &self.group) {
                warn!(code = %code, group = %self.group, error = %e, "could not unschedule removed job");
            }
        }
    }

    /// Poll on a fixed cadence until `shutdown` broadcasts `true`.
    ///
    /// Cycles for the same pair never overlap by construction: one loop,
    /// one cycle at a time.
    pub async fn run(&self, polling_rate_ms: u64, mut shutdown: watch::Receiver<bool>) {
        info!(group = %self.group, job_type = %self.job_type, polling_rate_ms, "reconciliation started");

        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(polling_rate_ms.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!(
                            group = %self.group,
                            job_type = %self.job_type,
                            error = %e,
                            "status exchange failed, keeping local state until next tick"
                        );
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!(group = %self.group, job_type = %self.job_type, "reconciliation stopped");
                        break;
                    }
                }
            }
        }
    }
}
