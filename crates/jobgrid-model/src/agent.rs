use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What an agent last did, as reported in its health record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentActivity {
    Register,
    Heartbeat,
    Shutdown,
}

/// Liveness snapshot of a worker agent, replaced on every heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentHealth {
    pub last_updated: DateTime<Utc>,
    pub last_activity: AgentActivity,
}

impl AgentHealth {
    /// Health stamped with the current time.
    pub fn now(activity: AgentActivity) -> Self {
        Self {
            last_updated: Utc::now(),
            last_activity: activity,
        }
    }
}

/// A registered worker agent.
///
/// Agents upsert themselves on registration and refresh `health` on each
/// heartbeat. No staleness expiry is applied here; records persist until
/// explicitly deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: String,
    pub cluster: String,
    /// The worker process this agent runs in.
    pub worker: String,
    pub name: String,
    #[serde(default)]
    pub health: Option<AgentHealth>,
    /// How often the agent promises to heartbeat, in milliseconds.
    pub heartbeat_freq_ms: u64,
    pub registered: DateTime<Utc>,
}
