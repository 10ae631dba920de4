use async_trait::async_trait;

use jobgrid_model::{
    AgentDefinition, AgentHealth, JobDefinition, JobIteration, JobStatus, MetadataRequest,
    MetadataResponse, StatusExchangeRequest, StatusExchangeResponse,
};

use crate::error::Result;

/// The scheduler communication channel between a worker and the controller.
///
/// Implementations must be `Send + Sync` so a single channel instance can be
/// shared across the reconciliation loop, the execution bridge, and the
/// agent reporter of one worker process.
#[async_trait]
pub trait SchedulerChannel: Send + Sync {
    /// Pull the distinct groups and types of a cluster.
    async fn metadata(&self, request: MetadataRequest) -> Result<MetadataResponse>;

    /// Exchange the worker's current scheduling state for the diff of
    /// added, updated, and removed jobs.
    async fn status_exchange(
        &self,
        request: StatusExchangeRequest,
    ) -> Result<StatusExchangeResponse>;

    /// Record one execution result. The returned iteration carries the
    /// store-assigned id.
    async fn iterate(&self, iteration: JobIteration) -> Result<JobIteration>;

    /// Change a job's status. Returns `None` when no job has that id; the
    /// caller decides whether that is an error.
    async fn mark_as(&self, id: &str, status: JobStatus) -> Result<Option<JobDefinition>>;

    /// Register (or re-register) an agent. Always upserts.
    async fn registration(&self, agent: AgentDefinition) -> Result<AgentDefinition>;

    /// Replace the health record of an agent. Returns `None` for an unknown
    /// agent id — a defined no-op, not an error.
    async fn heartbeat(&self, id: &str, health: AgentHealth) -> Result<Option<AgentDefinition>>;
}
