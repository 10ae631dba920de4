use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::payload::PayloadMap;

/// Outcome of a single job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IterationStatus {
    Success,
    Failure,
}

impl std::fmt::Display for IterationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            IterationStatus::Success => "SUCCESS",
            IterationStatus::Failure => "FAILURE",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for IterationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(IterationStatus::Success),
            "FAILURE" => Ok(IterationStatus::Failure),
            other => Err(format!("unknown iteration status: {other}")),
        }
    }
}

/// One recorded execution of a job. Immutable once stored; cleaned up in
/// bulk by the time-bound cleanup operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobIteration {
    /// Assigned by the store on insert; `None` until then.
    #[serde(default)]
    pub id: Option<String>,
    pub job_id: String,
    pub status: IterationStatus,
    /// Output the executor set, if any.
    #[serde(default)]
    pub payload: Option<PayloadMap>,
    /// Failure detail; absent on success.
    #[serde(default)]
    pub message: Option<String>,
    pub runtime_ms: u64,
    pub timestamp: DateTime<Utc>,
}

/// One page of iterations plus the total row count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationPage {
    pub iterations: Vec<JobIteration>,
    pub total: usize,
}
