use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use jobgrid_channel::{
    ChannelError, Result, SchedulerChannel, UpdateOperation, WorkerPublisher, WorkerUpdate,
};
use jobgrid_model::{
    AgentDefinition, AgentHealth, IterationPage, IterationStatus, JobDefinition, JobIteration,
    JobPage, JobStatus, MetadataRequest, MetadataResponse, StatusExchangeRequest,
    StatusExchangeResponse,
};
use jobgrid_store::{AgentStore, IterationStore, JobStore, StoreError};

/// The scheduler controller.
///
/// Stateless per call; the stores provide single-record atomicity and are
/// the only shared mutable resource. Fan-out publishers are invoked
/// synchronously in registration order and are strictly best-effort — the
/// persisted update is the source of truth, and the pull-based status
/// exchange catches any worker a publisher failed to reach.
pub struct SchedulerController {
    jobs: Arc<dyn JobStore>,
    iterations: Arc<dyn IterationStore>,
    agents: Arc<dyn AgentStore>,
    publishers: Vec<Arc<dyn WorkerPublisher>>,
}

impl SchedulerController {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        iterations: Arc<dyn IterationStore>,
        agents: Arc<dyn AgentStore>,
    ) -> Self {
        Self {
            jobs,
            iterations,
            agents,
            publishers: Vec::new(),
        }
    }

    /// Register a fan-out publisher. Publishers are notified in the order
    /// they were added.
    pub fn add_publisher(&mut self, publisher: Arc<dyn WorkerPublisher>) {
        self.publishers.push(publisher);
    }

    /// Gets all jobs, narrowed by type when one is given.
    pub fn get_all_jobs(&self, job_type: Option<&str>) -> Result<Vec<JobDefinition>> {
        match job_type {
            Some(t) => self.jobs.get_by_type(t).map_err(store_err),
            None => self.jobs.get_all().map_err(store_err),
        }
    }

    /// Gets one page of job definitions ordered by code.
    pub fn get_jobs_page(&self, page: usize, size: usize) -> Result<JobPage> {
        self.jobs.get_page_by_code(page, size).map_err(store_err)
    }

    /// Gets a job definition by id.
    pub fn get_job(&self, id: &str) -> Result<Option<JobDefinition>> {
        self.jobs.get_by_id(id).map_err(store_err)
    }

    /// Adds a job definition to the scheduler.
    ///
    /// An ADD notification goes out only when the inserted job is already
    /// ACTIVE; a DEFINED insert is invisible to workers until it is marked
    /// active.
    pub fn add_job(&self, definition: JobDefinition) -> Result<JobDefinition> {
        let inserted = self.jobs.insert(definition).map_err(store_err)?;
        info!(code = %inserted.code, group = %inserted.group, status = %inserted.status, "job added");

        if inserted.status.is_active() {
            self.publish_worker_update(WorkerUpdate {
                operation: UpdateOperation::Add,
                code: inserted.code.clone(),
                group: inserted.group.clone(),
                definition: Some(inserted.clone()),
            });
        }

        Ok(inserted)
    }

    /// Updates an existing job definition, emitting at most one fan-out
    /// notification derived from the ACTIVE-ness transition:
    ///
    /// | previous | new    | notification        |
    /// |----------|--------|---------------------|
    /// | inactive | inactive | none              |
    /// | active   | active   | UPDATE (with def) |
    /// | active   | inactive | REMOVE (no def)   |
    /// | inactive | active   | ADD (with def)    |
    ///
    /// Returns `None` when no job has the definition's id.
    pub fn update_job(&self, definition: JobDefinition) -> Result<Option<JobDefinition>> {
        let existing = match self.jobs.get_by_id(&definition.id).map_err(store_err)? {
            Some(existing) => existing,
            None => return Ok(None),
        };

        let updated = match self.jobs.update(definition).map_err(store_err)? {
            Some(updated) => updated,
            None => return Ok(None),
        };

        let was_active = existing.status.is_active();
        let is_active = updated.status.is_active();

        if was_active && is_active {
            self.publish_worker_update(WorkerUpdate {
                operation: UpdateOperation::Update,
                code: updated.code.clone(),
                group: updated.group.clone(),
                definition: Some(updated.clone()),
            });
        }

        if was_active && !is_active {
            self.publish_worker_update(WorkerUpdate {
                operation: UpdateOperation::Remove,
                code: updated.code.clone(),
                group: updated.group.clone(),
                definition: None,
            });
        }

        if !was_active && is_active {
            self.publish_worker_update(WorkerUpdate {
                operation: UpdateOperation::Add,
                code: updated.code.clone(),
                group: updated.group.clone(),
                definition: Some(updated.clone()),
            });
        }

        Ok(Some(updated))
    }

    /// Deletes a job, emitting a REMOVE notification when a record was
    /// actually removed.
    pub fn delete_job(&self, id: &str) -> Result<Option<JobDefinition>> {
        let deleted = self.jobs.delete_by_id(id).map_err(store_err)?;

        if let Some(ref deleted) = deleted {
            info!(code = %deleted.code, group = %deleted.group, "job deleted");
            self.publish_worker_update(WorkerUpdate {
                operation: UpdateOperation::Remove,
                code: deleted.code.clone(),
                group: deleted.group.clone(),
                definition: None,
            });
        }

        Ok(deleted)
    }

    /// Gets one page of a job's iterations, newest first, optionally
    /// filtered by status.
    pub fn get_iterations(
        &self,
        job_id: &str,
        status: Option<IterationStatus>,
        page: usize,
        size: usize,
    ) -> Result<IterationPage> {
        let statuses = status.map(|s| vec![s]);
        self.iterations
            .get_page_by_timestamp(job_id, statuses.as_deref(), page, size)
            .map_err(store_err)
    }

    /// Bulk-deletes iterations older than `upper`. Returns the count.
    pub fn cleanup_iterations(&self, upper: DateTime<Utc>) -> Result<u64> {
        self.iterations.delete_before(upper).map_err(store_err)
    }

    /// Gets all registered agents.
    pub fn get_agents(&self) -> Result<Vec<AgentDefinition>> {
        self.agents.get_all().map_err(store_err)
    }

    /// Gets an agent definition by id.
    pub fn get_agent(&self, id: &str) -> Result<Option<AgentDefinition>> {
        self.agents.get_by_id(id).map_err(store_err)
    }

    /// Deletes an agent registration.
    pub fn delete_agent(&self, id: &str) -> Result<Option<AgentDefinition>> {
        self.agents.delete_by_id(id).map_err(store_err)
    }

    /// All ACTIVE jobs of one (cluster, group, type) slice.
    fn get_all_active(
        &self,
        group: &str,
        job_type: &str,
        cluster: &str,
    ) -> Result<Vec<JobDefinition>> {
        self.jobs
            .get_by_status_in(
                Some(job_type),
                Some(group),
                Some(cluster),
                &[JobStatus::Active],
            )
            .map_err(store_err)
    }

    /// Deliver `update` to every registered publisher.
    ///
    /// A failing publisher is logged and skipped; the remaining publishers
    /// are still notified and the triggering operation is never rolled back.
    fn publish_worker_update(&self, update: WorkerUpdate) {
        for publisher in &self.publishers {
            if let Err(e) = publisher.publish(&update) {
                warn!(
                    code = %update.code,
                    group = %update.group,
                    error = %e,
                    "worker update publish failed"
                );
            }
        }
    }
}

#[async_trait]
impl SchedulerChannel for SchedulerController {
    async fn metadata(&self, request: MetadataRequest) -> Result<MetadataResponse> {
        let groups = self.jobs.get_groups(&request.cluster).map_err(store_err)?;
        let types = self.jobs.get_types(&request.cluster).map_err(store_err)?;

        Ok(MetadataResponse {
            cluster: request.cluster,
            groups,
            types,
        })
    }

    async fn status_exchange(
        &self,
        request: StatusExchangeRequest,
    ) -> Result<StatusExchangeResponse> {
        let all = self.get_all_active(&request.group, &request.job_type, &request.cluster)?;
        let all_codes: HashSet<String> = all.iter().map(|j| j.code.clone()).collect();

        let mut added = BTreeMap::new();
        let mut updated = BTreeMap::new();

        for job in all {
            let known = match request.state.get(&job.code) {
                Some(known) => *known,
                // absent from the worker's state: the job is new to it
                None => {
                    added.insert(job.code.clone(), job);
                    continue;
                }
            };

            // without a stored modification time there is nothing to compare
            let modified = match job.modified {
                Some(modified) => modified,
                None => continue,
            };

            if known == modified {
                continue;
            }

            if modified > known {
                updated.insert(job.code.clone(), job);
            }
            // known > modified is a clock-skew anomaly: defined no-op
        }

        // anything the worker still schedules that is no longer active
        let removed: Vec<String> = request
            .state
            .keys()
            .filter(|code| !all_codes.contains(code.as_str()))
            .cloned()
            .collect();

        debug!(
            group = %request.group,
            job_type = %request.job_type,
            added = added.len(),
            updated = updated.len(),
            removed = removed.len(),
            "status exchange computed"
        );

        Ok(StatusExchangeResponse {
            group: request.group,
            job_type: request.job_type,
            added,
            updated,
            removed,
        })
    }

    async fn iterate(&self, iteration: JobIteration) -> Result<JobIteration> {
        self.iterations.insert(iteration).map_err(store_err)
    }

    async fn mark_as(&self, id: &str, status: JobStatus) -> Result<Option<JobDefinition>> {
        let existing = match self.jobs.get_by_id(id).map_err(store_err)? {
            Some(existing) => existing,
            None => return Ok(None),
        };

        let mut clone = existing;
        clone.status = status;
        self.update_job(clone)
    }

    async fn registration(&self, agent: AgentDefinition) -> Result<AgentDefinition> {
        let registered = self.agents.upsert(agent).map_err(store_err)?;
        info!(agent = %registered.id, worker = %registered.worker, cluster = %registered.cluster, "agent registered");
        Ok(registered)
    }

    async fn heartbeat(&self, id: &str, health: AgentHealth) -> Result<Option<AgentDefinition>> {
        let existing = match self.agents.get_by_id(id).map_err(store_err)? {
            Some(existing) => existing,
            None => return Ok(None),
        };

        let mut clone = existing;
        clone.health = Some(health);
        self.agents.update(clone).map_err(store_err)
    }
}

fn store_err(e: StoreError) -> ChannelError {
    match e {
        StoreError::Conflict { code, group } => ChannelError::Conflict { code, group },
        other => ChannelError::Store(other.to_string()),
    }
}
