use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use jobgrid_model::{
    AgentDefinition, IterationPage, IterationStatus, JobDefinition, JobIteration, JobPage,
    JobStatus,
};

use crate::error::{Result, StoreError};
use crate::traits::{AgentStore, IterationStore, JobStore};

/// In-memory job store backed by a `RwLock<HashMap>`.
///
/// Used by tests and by embedded single-process deployments where nothing
/// needs to survive a restart.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<String, JobDefinition>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobStore for MemoryJobStore {
    fn get_by_id(&self, id: &str) -> Result<Option<JobDefinition>> {
        Ok(self.jobs.read().unwrap().get(id).cloned())
    }

    fn get_all(&self) -> Result<Vec<JobDefinition>> {
        let mut all: Vec<_> = self.jobs.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(all)
    }

    fn get_page_by_code(&self, page: usize, size: usize) -> Result<JobPage> {
        let all = self.get_all()?;
        let total = all.len();
        let jobs = all.into_iter().skip(page * size).take(size).collect();
        Ok(JobPage { jobs, total })
    }

    fn get_by_type(&self, job_type: &str) -> Result<Vec<JobDefinition>> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.job_type == job_type)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(jobs)
    }

    fn get_by_status_in(
        &self,
        job_type: Option<&str>,
        group: Option<&str>,
        cluster: Option<&str>,
        statuses: &[JobStatus],
    ) -> Result<Vec<JobDefinition>> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| statuses.contains(&j.status))
            .filter(|j| job_type.is_none_or(|t| j.job_type == t))
            .filter(|j| group.is_none_or(|g| j.group == g))
            .filter(|j| cluster.is_none_or(|c| j.cluster == c))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(jobs)
    }

    fn get_groups(&self, cluster: &str) -> Result<Vec<String>> {
        let mut groups: Vec<String> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.cluster == cluster)
            .map(|j| j.group.clone())
            .collect();
        groups.sort();
        groups.dedup();
        Ok(groups)
    }

    fn get_types(&self, cluster: &str) -> Result<Vec<String>> {
        let mut types: Vec<String> = self
            .jobs
            .read()
            .unwrap()
            .values()
            .filter(|j| j.cluster == cluster)
            .map(|j| j.job_type.clone())
            .collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    fn insert(&self, mut definition: JobDefinition) -> Result<JobDefinition> {
        let mut jobs = self.jobs.write().unwrap();

        if definition.status.is_active() {
            let clash = jobs.values().any(|j| {
                j.status.is_active()
                    && j.code == definition.code
                    && j.group == definition.group
                    && j.cluster == definition.cluster
            });
            if clash {
                return Err(StoreError::Conflict {
                    code: definition.code,
                    group: definition.group,
                });
            }
        }

        let now = Utc::now();
        if definition.id.is_empty() {
            definition.id = Uuid::new_v4().to_string();
        }
        if definition.created.is_none() {
            definition.created = Some(now);
        }
        if definition.modified.is_none() {
            definition.modified = Some(now);
        }

        jobs.insert(definition.id.clone(), definition.clone());
        Ok(definition)
    }

    fn update(&self, mut definition: JobDefinition) -> Result<Option<JobDefinition>> {
        let mut jobs = self.jobs.write().unwrap();
        if !jobs.contains_key(&definition.id) {
            return Ok(None);
        }

        // a status change to ACTIVE must not create a second ACTIVE
        // (code, group) in the cluster
        if definition.status.is_active() {
            let clash = jobs.values().any(|j| {
                j.id != definition.id
                    && j.status.is_active()
                    && j.code == definition.code
                    && j.group == definition.group
                    && j.cluster == definition.cluster
            });
            if clash {
                return Err(StoreError::Conflict {
                    code: definition.code,
                    group: definition.group,
                });
            }
        }

        definition.modified = Some(Utc::now());
        jobs.insert(definition.id.clone(), definition.clone());
        Ok(Some(definition))
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<JobDefinition>> {
        Ok(self.jobs.write().unwrap().remove(id))
    }

    fn delete_all(&self) -> Result<()> {
        self.jobs.write().unwrap().clear();
        Ok(())
    }
}

/// In-memory iteration store. Keeps records in insertion order and sorts
/// per query, which is plenty for test-sized histories.
#[derive(Default)]
pub struct MemoryIterationStore {
    iterations: RwLock<Vec<JobIteration>>,
}

impl MemoryIterationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IterationStore for MemoryIterationStore {
    fn get_by_id(&self, id: &str) -> Result<Option<JobIteration>> {
        Ok(self
            .iterations
            .read()
            .unwrap()
            .iter()
            .find(|i| i.id.as_deref() == Some(id))
            .cloned())
    }

    fn get_all(&self) -> Result<Vec<JobIteration>> {
        Ok(self.iterations.read().unwrap().clone())
    }

    fn get_page_by_timestamp(
        &self,
        job_id: &str,
        statuses: Option<&[IterationStatus]>,
        page: usize,
        size: usize,
    ) -> Result<IterationPage> {
        let mut matching: Vec<_> = self
            .iterations
            .read()
            .unwrap()
            .iter()
            .filter(|i| i.job_id == job_id)
            .filter(|i| statuses.is_none_or(|s| s.contains(&i.status)))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let total = matching.len();
        let iterations = matching.into_iter().skip(page * size).take(size).collect();
        Ok(IterationPage { iterations, total })
    }

    fn insert(&self, mut iteration: JobIteration) -> Result<JobIteration> {
        iteration.id = Some(Uuid::new_v4().to_string());
        self.iterations.write().unwrap().push(iteration.clone());
        Ok(iteration)
    }

    fn delete_before(&self, upper: DateTime<Utc>) -> Result<u64> {
        let mut iterations = self.iterations.write().unwrap();
        let before = iterations.len();
        iterations.retain(|i| i.timestamp >= upper);
        Ok((before - iterations.len()) as u64)
    }

    fn delete_all(&self) -> Result<()> {
        self.iterations.write().unwrap().clear();
        Ok(())
    }
}

/// In-memory agent store.
#[derive(Default)]
pub struct MemoryAgentStore {
    agents: RwLock<HashMap<String, AgentDefinition>>,
}

impl MemoryAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AgentStore for MemoryAgentStore {
    fn get_by_id(&self, id: &str) -> Result<Option<AgentDefinition>> {
        Ok(self.agents.read().unwrap().get(id).cloned())
    }

    fn get_all(&self) -> Result<Vec<AgentDefinition>> {
        let mut all: Vec<_> = self.agents.read().unwrap().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    fn upsert(&self, mut agent: AgentDefinition) -> Result<AgentDefinition> {
        if agent.id.is_empty() {
            agent.id = Uuid::new_v4().to_string();
        }
        self.agents
            .write()
            .unwrap()
            .insert(agent.id.clone(), agent.clone());
        Ok(agent)
    }

    fn update(&self, agent: AgentDefinition) -> Result<Option<AgentDefinition>> {
        let mut agents = self.agents.write().unwrap();
        if !agents.contains_key(&agent.id) {
            return Ok(None);
        }
        agents.insert(agent.id.clone(), agent.clone());
        Ok(Some(agent))
    }

    fn delete_by_id(&self, id: &str) -> Result<Option<AgentDefinition>> {
        Ok(self.agents.write().unwrap().remove(id))
    }

    fn delete_all(&self) -> Result<()> {
        self.agents.write().unwrap().clear();
        Ok(())
    }
}
