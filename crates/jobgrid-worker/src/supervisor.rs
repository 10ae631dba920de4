use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use jobgrid_channel::{UpdateOperation, WorkerUpdate};

use crate::engine::WorkerEngine;

/// Push-side consumer of fan-out worker updates.
///
/// Applies ADD/UPDATE/REMOVE to the engine as they arrive, shaving the
/// polling latency off state changes. Everything here is acceleration
/// only: a dropped, lagged, or failed update is simply caught by the next
/// reconciliation cycle.
pub struct WorkerSupervisor {
    engine: Arc<WorkerEngine>,
    /// Groups this worker schedules; empty means all groups are accepted.
    groups: HashSet<String>,
}

impl WorkerSupervisor {
    pub fn new(engine: Arc<WorkerEngine>, groups: impl IntoIterator<Item = String>) -> Self {
        Self {
            engine,
            groups: groups.into_iter().collect(),
        }
    }

    /// Consume `updates` until the stream closes or `shutdown` broadcasts
    /// `true`.
    pub async fn run(
        &self,
        mut updates: broadcast::Receiver<WorkerUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("worker supervisor started");

        loop {
            tokio::select! {
                received = updates.recv() => {
                    match received {
                        Ok(update) => self.apply(update),
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "update stream lagged, reconciliation will catch up");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("update stream closed, supervisor stopping");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("worker supervisor stopped");
                        break;
                    }
                }
            }
        }
    }

    /// Apply a single update to the engine.
    pub fn apply(&self, update: WorkerUpdate) {
        if !self.groups.is_empty() && !self.groups.contains(&update.group) {
            debug!(code = %update.code, group = %update.group, "update outside supervised groups, ignored");
            return;
        }

        match update.operation {
            UpdateOperation::Add => {
                let Some(definition) = update.definition else {
                    warn!(code = %update.code, group = %update.group, "add update without definition, ignored");
                    return;
                };
                if let Err(e) = self.engine.schedule(&definition) {
                    warn!(code = %update.code, group = %update.group, error = %e, "push add failed, reconciliation will catch up");
                }
            }
            UpdateOperation::Update => {
                let Some(definition) = update.definition else {
                    warn!(code = %update.code, group = %update.group, "update without definition, ignored");
                    return;
                };
                if let Err(e) = self.engine.reschedule(&definition) {
                    warn!(code = %update.code, group = %update.group, error = %e, "push update failed, reconciliation will catch up");
                }
            }
            UpdateOperation::Remove => {
                if let Err(e) = self.engine.unschedule(&update.code, &update.group) {
                    warn!(code = %update.code, group = %update.group, error = %e, "push remove failed, reconciliation will catch up");
                }
            }
        }
    }
}
