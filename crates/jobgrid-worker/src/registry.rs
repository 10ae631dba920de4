use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use jobgrid_model::{ExecutionOptions, JobDefinition, PayloadMap};

use crate::compile::ScheduleEntry;

/// Logical key a job is scheduled under.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub code: String,
    pub group: String,
}

impl JobKey {
    pub fn new(code: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            group: group.into(),
        }
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.code, self.group)
    }
}

/// Execution-facing snapshot of a scheduled job's definition.
///
/// Everything the bridge needs at fire time, frozen when the job is
/// (re)scheduled so an in-flight execution is unaffected by later
/// registry mutations.
#[derive(Debug)]
pub struct JobHandle {
    pub id: String,
    pub code: String,
    pub group: String,
    pub job_type: String,
    pub cluster: String,
    pub execution: ExecutionOptions,
    /// Modification time the job was scheduled from; feeds the
    /// reconciliation snapshot.
    pub modified: Option<DateTime<Utc>>,
    /// Job-scope payload visible to the executor context.
    pub payload: PayloadMap,
}

impl JobHandle {
    pub fn from_definition(definition: &JobDefinition) -> Self {
        Self {
            id: definition.id.clone(),
            code: definition.code.clone(),
            group: definition.group.clone(),
            job_type: definition.job_type.clone(),
            cluster: definition.cluster.clone(),
            execution: definition.execution,
            modified: definition.modified,
            payload: definition.payload.clone(),
        }
    }
}

/// A job plus its live schedule entries.
pub struct ScheduledJob {
    pub handle: std::sync::Arc<JobHandle>,
    pub entries: Vec<ScheduleEntry>,
}

/// In-memory index of scheduled jobs, owned by one worker engine.
///
/// Not internally synchronised — the engine serialises all access through
/// its exclusive lock.
#[derive(Default)]
pub struct Registry {
    jobs: HashMap<JobKey, ScheduledJob>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &JobKey) -> bool {
        self.jobs.contains_key(key)
    }

    pub fn insert(&mut self, key: JobKey, job: ScheduledJob) {
        self.jobs.insert(key, job);
    }

    pub fn remove(&mut self, key: &JobKey) -> Option<ScheduledJob> {
        self.jobs.remove(key)
    }

    pub fn get_mut(&mut self, key: &JobKey) -> Option<&mut ScheduledJob> {
        self.jobs.get_mut(key)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&JobKey, &mut ScheduledJob)> {
        self.jobs.iter_mut()
    }

    /// Codes of all jobs scheduled in `group`.
    pub fn codes_in_group(&self, group: &str) -> BTreeSet<String> {
        self.jobs
            .keys()
            .filter(|key| key.group == group)
            .map(|key| key.code.clone())
            .collect()
    }

    /// The reconciliation snapshot for one (group, type) slice:
    /// `code → modified` for every job whose modification time is known.
    /// Jobs without one are not yet comparable and are skipped.
    pub fn snapshot(&self, group: &str, job_type: &str) -> BTreeMap<String, DateTime<Utc>> {
        self.jobs
            .values()
            .filter(|job| job.handle.group == group && job.handle.job_type == job_type)
            .filter_map(|job| {
                job.handle
                    .modified
                    .map(|modified| (job.handle.code.clone(), modified))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}
