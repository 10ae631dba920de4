use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use jobgrid_model::JobDefinition;

use crate::error::Result;

/// How many update messages may queue per subscriber before the oldest
/// are dropped (lagged receivers resynchronise via status exchange).
const BROADCAST_CAPACITY: usize = 256;

/// What a worker should do with the job named in a [`WorkerUpdate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpdateOperation {
    Add,
    Update,
    Remove,
}

/// Fan-out notification emitted when a job's ACTIVE-ness changes.
///
/// `definition` is present for ADD and UPDATE, absent for REMOVE — a worker
/// only needs `(code, group)` to unschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerUpdate {
    pub operation: UpdateOperation,
    pub code: String,
    pub group: String,
    #[serde(default)]
    pub definition: Option<JobDefinition>,
}

/// Push-side delivery of worker updates.
///
/// Publishing is synchronous and best-effort: the controller logs a failed
/// publisher and moves on, never rolling back the persisted change.
pub trait WorkerPublisher: Send + Sync {
    fn publish(&self, update: &WorkerUpdate) -> Result<()>;
}

/// In-process fan-out over a tokio broadcast channel.
///
/// Workers subscribe a supervisor loop to the receiver side; the controller
/// publishes into the sender side. Having no subscribers is not an error —
/// the update is simply dropped and the pull path catches up.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<WorkerUpdate>,
}

impl BroadcastPublisher {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx }
    }

    /// New consumer subscribes to the update stream.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerUpdate> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerPublisher for BroadcastPublisher {
    fn publish(&self, update: &WorkerUpdate) -> Result<()> {
        match self.tx.send(update.clone()) {
            Ok(receivers) => {
                debug!(code = %update.code, group = %update.group, receivers, "worker update broadcast");
                Ok(())
            }
            // No live receivers — nothing to deliver, not a failure.
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }
}
