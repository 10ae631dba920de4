use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::payload::PayloadMap;
use crate::trigger::TriggerDefinition;

/// Lifecycle status of a job definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Created but not yet released to workers.
    Defined,
    /// Eligible for scheduling; delivered to workers via status exchange.
    Active,
    /// Temporarily withheld from workers.
    Paused,
    /// Marked broken by an operator or an external monitor.
    Failed,
    /// All triggers fired for the last time; the job will not run again.
    Completed,
}

impl JobStatus {
    /// Only ACTIVE jobs take part in the exchange protocol and fan-out
    /// notifications; every other status is invisible to workers.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Active)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Defined => "DEFINED",
            JobStatus::Active => "ACTIVE",
            JobStatus::Paused => "PAUSED",
            JobStatus::Failed => "FAILED",
            JobStatus::Completed => "COMPLETED",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "DEFINED" => Ok(JobStatus::Defined),
            "ACTIVE" => Ok(JobStatus::Active),
            "PAUSED" => Ok(JobStatus::Paused),
            "FAILED" => Ok(JobStatus::Failed),
            "COMPLETED" => Ok(JobStatus::Completed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// Per-job execution tuning flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// When set, successful and failed runs alike produce no iteration
    /// record. Meant for high-frequency jobs whose history has no value.
    #[serde(default)]
    pub silent_iterations: bool,
}

/// A durable job definition held by the controller.
///
/// `id` is the storage key; `(code, group)` is the logical key a worker
/// schedules under, unique among ACTIVE jobs of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDefinition {
    /// Storage identifier, assigned by the store on first insert.
    #[serde(default)]
    pub id: String,
    pub code: String,
    pub group: String,
    /// Executor type looked up in the worker's registry at fire time.
    #[serde(rename = "type")]
    pub job_type: String,
    pub cluster: String,
    pub status: JobStatus,
    #[serde(default)]
    pub triggers: Vec<TriggerDefinition>,
    #[serde(default)]
    pub execution: ExecutionOptions,
    /// Opaque routing hints, not interpreted by the scheduler itself.
    #[serde(default)]
    pub selectors: BTreeMap<String, String>,
    /// Job-scoped key-values visible to the executor context.
    #[serde(default)]
    pub payload: PayloadMap,
    /// Extra metadata carried alongside the definition.
    #[serde(default)]
    pub extra: PayloadMap,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub modified_by: Option<String>,
    #[serde(default)]
    pub created: Option<DateTime<Utc>>,
    /// Last modification time; drives the added/updated classification of
    /// the status exchange.
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
}

impl JobDefinition {
    /// The `code:group` identity string used to scope trigger keys.
    pub fn identity(&self) -> String {
        format!("{}:{}", self.code, self.group)
    }
}

/// One page of job definitions plus the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPage {
    pub jobs: Vec<JobDefinition>,
    pub total: usize,
}
