use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::job::JobDefinition;

/// Request for the distinct groups and types of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRequest {
    pub cluster: String,
}

/// Distinct groups and types among all job definitions of a cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataResponse {
    pub cluster: String,
    pub groups: Vec<String>,
    pub types: Vec<String>,
}

/// A worker's view of one (group, type) scheduling slice: for every locally
/// scheduled job, the modification timestamp it was scheduled from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusExchangeRequest {
    pub cluster: String,
    pub group: String,
    #[serde(rename = "type")]
    pub job_type: String,
    /// Job code → last-known-modified timestamp.
    #[serde(default)]
    pub state: BTreeMap<String, DateTime<Utc>>,
}

/// The controller's diff against the worker-supplied state.
///
/// `added` and `updated` carry full definitions; `removed` only the codes,
/// since the worker needs nothing else to unschedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusExchangeResponse {
    pub group: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(default)]
    pub added: BTreeMap<String, JobDefinition>,
    #[serde(default)]
    pub updated: BTreeMap<String, JobDefinition>,
    #[serde(default)]
    pub removed: Vec<String>,
}

impl StatusExchangeResponse {
    /// True when the worker state already matches the controller.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}
