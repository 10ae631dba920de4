use chrono::{DateTime, Utc};

use jobgrid_model::{
    AgentDefinition, IterationPage, IterationStatus, JobDefinition, JobIteration, JobPage,
    JobStatus,
};

use crate::error::Result;

/// Durable storage of job definitions.
///
/// Implementations must provide atomic single-record read-modify-write; the
/// controller layers no additional locking on top. `insert` enforces the
/// one-ACTIVE-job-per-(code, group, cluster) invariant.
pub trait JobStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<JobDefinition>>;

    fn get_all(&self) -> Result<Vec<JobDefinition>>;

    /// One page of definitions ordered by code. `page` is zero-based.
    fn get_page_by_code(&self, page: usize, size: usize) -> Result<JobPage>;

    fn get_by_type(&self, job_type: &str) -> Result<Vec<JobDefinition>>;

    /// Definitions whose status is in `statuses`, optionally narrowed by
    /// type, group, and cluster.
    fn get_by_status_in(
        &self,
        job_type: Option<&str>,
        group: Option<&str>,
        cluster: Option<&str>,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDefinition>>;

    /// Distinct groups in the cluster, sorted.
    fn get_groups(&self, cluster: &str) -> Result<Vec<String>>;

    /// Distinct types in the cluster, sorted.
    fn get_types(&self, cluster: &str) -> Result<Vec<String>>;

    /// Insert a definition, assigning an id when none is set and stamping
    /// `created`/`modified`. Fails with [`StoreError::Conflict`] when an
    /// ACTIVE job with the same (code, group) exists in the cluster.
    ///
    /// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
    fn insert(&self, definition: JobDefinition) -> Result<JobDefinition>;

    /// Replace an existing definition, bumping `modified`. Returns `None`
    /// when no record has the definition's id. Like `insert`, fails with
    /// [`StoreError::Conflict`] when the new status is ACTIVE and another
    /// ACTIVE job holds the same (code, group) in the cluster.
    ///
    /// [`StoreError::Conflict`]: crate::error::StoreError::Conflict
    fn update(&self, definition: JobDefinition) -> Result<Option<JobDefinition>>;

    /// Delete by id, returning the removed definition if there was one.
    fn delete_by_id(&self, id: &str) -> Result<Option<JobDefinition>>;

    fn delete_all(&self) -> Result<()>;
}

/// Append-only storage of execution results.
pub trait IterationStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<JobIteration>>;

    fn get_all(&self) -> Result<Vec<JobIteration>>;

    /// One page of a job's iterations ordered newest first, optionally
    /// filtered by status. `page` is zero-based.
    fn get_page_by_timestamp(
        &self,
        job_id: &str,
        statuses: Option<&[IterationStatus]>,
        page: usize,
        size: usize,
    ) -> Result<IterationPage>;

    /// Insert an iteration, assigning its id.
    fn insert(&self, iteration: JobIteration) -> Result<JobIteration>;

    /// Bulk-delete every iteration older than `upper`. Returns the number
    /// of rows removed.
    fn delete_before(&self, upper: DateTime<Utc>) -> Result<u64>;

    fn delete_all(&self) -> Result<()>;
}

/// Storage of worker agent registrations.
pub trait AgentStore: Send + Sync {
    fn get_by_id(&self, id: &str) -> Result<Option<AgentDefinition>>;

    fn get_all(&self) -> Result<Vec<AgentDefinition>>;

    /// Insert or fully replace the agent with the same id.
    fn upsert(&self, agent: AgentDefinition) -> Result<AgentDefinition>;

    /// Replace an existing agent. Returns `None` when the id is unknown.
    fn update(&self, agent: AgentDefinition) -> Result<Option<AgentDefinition>>;

    fn delete_by_id(&self, id: &str) -> Result<Option<AgentDefinition>>;

    fn delete_all(&self) -> Result<()>;
}
