use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use jobgrid_channel::SchedulerChannel;
use jobgrid_model::{AgentActivity, AgentDefinition, AgentHealth};

use crate::error::{Result, WorkerError};

/// Delay between registration attempts.
const REGISTRATION_RETRY_DELAY_MS: u64 = 2_000;

/// Register `agent` with the controller, retrying up to `tries` times.
///
/// Registration failing for good is a startup-fatal condition — without a
/// registered agent the fleet has no record of this worker.
pub async fn register_with_retries(
    channel: &Arc<dyn SchedulerChannel>,
    agent: AgentDefinition,
    tries: u32,
) -> Result<AgentDefinition> {
    let tries = tries.max(1);

    for attempt in 1..=tries {
        match channel.registration(agent.clone()).await {
            Ok(registered) => {
                info!(agent = %registered.id, attempt, "agent registered");
                return Ok(registered);
            }
            Err(e) => {
                warn!(attempt, max = tries, error = %e, "agent registration failed");
                if attempt < tries {
                    sleep(Duration::from_millis(REGISTRATION_RETRY_DELAY_MS)).await;
                }
            }
        }
    }

    Err(WorkerError::Registration { tries })
}

/// Periodic heartbeat emitter for one registered agent.
pub struct AgentReporter {
    channel: Arc<dyn SchedulerChannel>,
    agent_id: String,
}

impl AgentReporter {
    pub fn new(channel: Arc<dyn SchedulerChannel>, agent_id: impl Into<String>) -> Self {
        Self {
            channel,
            agent_id: agent_id.into(),
        }
    }

    /// Heartbeat every `heartbeat_rate_ms` until `shutdown` broadcasts
    /// `true`, then send one final SHUTDOWN health update.
    ///
    /// A controller that no longer knows the agent answers with an absent
    /// result; that is logged, not fatal — the next registration cycle can
    /// re-create the record.
    pub async fn run(&self, heartbeat_rate_ms: u64, mut shutdown: watch::Receiver<bool>) {
        info!(agent = %self.agent_id, heartbeat_rate_ms, "heartbeat loop started");

        let mut interval =
            tokio::time::interval(std::time::Duration::from_millis(heartbeat_rate_ms.max(1)));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.beat(AgentActivity::Heartbeat).await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        self.beat(AgentActivity::Shutdown).await;
                        info!(agent = %self.agent_id, "heartbeat loop stopped");
                        break;
                    }
                }
            }
        }
    }

    async fn beat(&self, activity: AgentActivity) {
        match self
            .channel
            .heartbeat(&self.agent_id, AgentHealth::now(activity))
            .await
        {
            Ok(Some(_)) => {}
            Ok(None) => {
                warn!(agent = %self.agent_id, "controller does not know this agent, heartbeat dropped");
            }
            Err(e) => {
                warn!(agent = %self.agent_id, error = %e, "heartbeat failed");
            }
        }
    }
}
