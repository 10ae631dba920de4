use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use jobgrid_model::{JobDefinition, PayloadMap};

use crate::compile::{compile_triggers, TriggerKey};
use crate::error::{Result, WorkerError};
use crate::registry::{JobHandle, JobKey, Registry, ScheduledJob};

/// A schedule entry whose fire time has arrived, ready for execution.
#[derive(Debug)]
pub struct FiredEntry {
    pub handle: Arc<JobHandle>,
    pub trigger: TriggerKey,
    /// Trigger-scope payload, overriding the job payload in merged lookups.
    pub trigger_payload: PayloadMap,
}

/// Events the engine emits towards the execution bridge.
#[derive(Debug)]
pub enum EngineEvent {
    /// A trigger fired; run the job once.
    Fired(FiredEntry),
    /// The last schedule entry of a job ran out. The job stays registered
    /// until reconciliation removes it; reporting the completion upstream
    /// is the bridge's business.
    Exhausted { handle: Arc<JobHandle> },
}

/// The local scheduling engine of one worker process.
///
/// All mutating operations (and the snapshot read) serialise on a single
/// exclusive lock over the registry — scheduling churn is rare next to job
/// execution, so the simplicity is worth more than the lost throughput.
/// Firing is decoupled through an mpsc channel: executions never run under
/// the lock, and an execution in flight survives its job being removed.
pub struct WorkerEngine {
    registry: Mutex<Registry>,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl WorkerEngine {
    /// Create an engine that emits fired entries into `events_tx`.
    ///
    /// The sender is used non-blocking (`try_send`) so the tick loop is
    /// never stalled by a slow consumer.
    pub fn new(events_tx: mpsc::Sender<EngineEvent>) -> Self {
        Self {
            registry: Mutex::new(Registry::new()),
            events_tx,
        }
    }

    /// Register `definition` and activate its compiled triggers.
    ///
    /// Scheduling an already-scheduled job is an explicit no-op, not an
    /// error — reconciliation and push updates may race benignly. A job
    /// whose triggers all compile to nothing is still registered; it just
    /// never fires.
    pub fn schedule(&self, definition: &JobDefinition) -> Result<()> {
        let mut registry = self.registry.lock().unwrap();
        let key = JobKey::new(&definition.code, &definition.group);

        if registry.contains(&key) {
            debug!(job = %key, "job already scheduled, skipping");
            return Ok(());
        }

        let handle = Arc::new(JobHandle::from_definition(definition));
        let entries = compile_triggers(definition, Utc::now());
        info!(job = %key, triggers = entries.len(), "job scheduled");
        registry.insert(key, ScheduledJob { handle, entries });
        Ok(())
    }

    /// Replace the trigger entries and metadata of an already-scheduled job
    /// with the new definition.
    pub fn reschedule(&self, definition: &JobDefinition) -> Result<()> {
        let mut registry = self.registry.lock().unwrap();
        let key = JobKey::new(&definition.code, &definition.group);

        if !registry.contains(&key) {
            return Err(WorkerError::NotScheduled {
                code: definition.code.clone(),
                group: definition.group.clone(),
            });
        }

        // drop the old entries wholesale, then rebuild from scratch
        registry.remove(&key);
        let handle = Arc::new(JobHandle::from_definition(definition));
        let entries = compile_triggers(definition, Utc::now());
        info!(job = %key, triggers = entries.len(), "job rescheduled");
        registry.insert(key, ScheduledJob { handle, entries });
        Ok(())
    }

    /// Remove a job and all its entries.
    pub fn unschedule(&self, code: &str, group: &str) -> Result<()> {
        let mut registry = self.registry.lock().unwrap();
        let key = JobKey::new(code, group);

        if registry.remove(&key).is_none() {
            return Err(WorkerError::NotScheduled {
                code: code.to_string(),
                group: group.to_string(),
            });
        }
        info!(job = %key, "job unscheduled");
        Ok(())
    }

    /// Codes of all jobs currently scheduled in `group`.
    pub fn jobs_in_group(&self, group: &str) -> BTreeSet<String> {
        self.registry.lock().unwrap().codes_in_group(group)
    }

    /// The reconciliation snapshot (`code → modified`) for one
    /// (group, type) slice.
    pub fn snapshot(&self, group: &str, job_type: &str) -> BTreeMap<String, DateTime<Utc>> {
        self.registry.lock().unwrap().snapshot(group, job_type)
    }

    /// Number of jobs currently registered.
    pub fn job_count(&self) -> usize {
        self.registry.lock().unwrap().len()
    }

    /// Main tick loop. Fires due entries every second until `shutdown`
    /// broadcasts `true`.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("worker engine started");

        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now());
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("worker engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every due entry, advance fire times, and drop exhausted
    /// entries. Public for deterministic tests; `run` calls it once per
    /// second.
    pub fn tick(&self, now: DateTime<Utc>) {
        let mut registry = self.registry.lock().unwrap();

        for (key, job) in registry.iter_mut() {
            if job.entries.is_empty() {
                continue;
            }

            for entry in job.entries.iter_mut() {
                if !entry.is_due(now) {
                    continue;
                }

                let fired = EngineEvent::Fired(FiredEntry {
                    handle: job.handle.clone(),
                    trigger: entry.key.clone(),
                    trigger_payload: entry.payload.clone(),
                });
                // try_send never blocks the tick loop; a full or closed
                // channel drops this firing
                if self.events_tx.try_send(fired).is_err() {
                    warn!(job = %key, trigger = %entry.key, "event channel full or closed, firing dropped");
                }
                entry.advance(now);
            }

            job.entries.retain(|entry| !entry.is_exhausted());

            // every entry ran out in this tick: announce it exactly once
            if job.entries.is_empty() {
                debug!(job = %key, "all triggers exhausted");
                if self
                    .events_tx
                    .try_send(EngineEvent::Exhausted {
                        handle: job.handle.clone(),
                    })
                    .is_err()
                {
                    warn!(job = %key, "event channel full or closed, exhaustion dropped");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jobgrid_model::{ExecutionOptions, JobStatus, TriggerDefinition};

    fn job(code: &str, triggers: Vec<TriggerDefinition>) -> JobDefinition {
        JobDefinition {
            id: format!("id-{code}"),
            code: code.into(),
            group: "g".into(),
            job_type: "report".into(),
            cluster: "main".into(),
            status: JobStatus::Active,
            triggers,
            execution: ExecutionOptions::default(),
            selectors: Default::default(),
            payload: PayloadMap::new(),
            extra: PayloadMap::new(),
            created_by: None,
            modified_by: None,
            created: None,
            modified: Some(Utc::now()),
        }
    }

    fn engine() -> (WorkerEngine, mpsc::Receiver<EngineEvent>) {
        let (tx, rx) = mpsc::channel(64);
        (WorkerEngine::new(tx), rx)
    }

    #[tokio::test]
    async fn schedule_twice_is_a_no_op() {
        let (engine, _rx) = engine();
        let job = job("a", vec![TriggerDefinition::period(60_000.0)]);

        engine.schedule(&job).unwrap();
        engine.schedule(&job).unwrap();

        assert_eq!(engine.job_count(), 1);
        assert_eq!(engine.jobs_in_group("g").len(), 1);
    }

    #[tokio::test]
    async fn reschedule_requires_existing_job() {
        let (engine, _rx) = engine();
        let job = job("a", vec![TriggerDefinition::period(60_000.0)]);

        let err = engine.reschedule(&job).unwrap_err();
        assert!(matches!(err, WorkerError::NotScheduled { .. }));

        engine.schedule(&job).unwrap();
        engine.reschedule(&job).unwrap();
        assert_eq!(engine.job_count(), 1);
    }

    #[tokio::test]
    async fn unschedule_removes_or_errors() {
        let (engine, _rx) = engine();
        engine
            .schedule(&job("a", vec![TriggerDefinition::period(60_000.0)]))
            .unwrap();

        engine.unschedule("a", "g").unwrap();
        assert_eq!(engine.job_count(), 0);

        let err = engine.unschedule("a", "g").unwrap_err();
        assert!(matches!(err, WorkerError::NotScheduled { .. }));
    }

    #[tokio::test]
    async fn zero_valid_triggers_registers_but_never_fires() {
        let (engine, mut rx) = engine();
        engine
            .schedule(&job("a", vec![TriggerDefinition::period(0.0)]))
            .unwrap();
        assert_eq!(engine.job_count(), 1);

        engine.tick(Utc::now() + Duration::hours(1));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn snapshot_filters_type_and_missing_modified() {
        let (engine, _rx) = engine();

        let mut no_modified = job("silent", vec![]);
        no_modified.modified = None;
        let mut other_type = job("other", vec![]);
        other_type.job_type = "sync".into();

        engine.schedule(&job("a", vec![])).unwrap();
        engine.schedule(&no_modified).unwrap();
        engine.schedule(&other_type).unwrap();

        let snapshot = engine.snapshot("g", "report");
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains_key("a"));
    }

    #[tokio::test]
    async fn due_entry_fires_with_trigger_payload() {
        let (engine, mut rx) = engine();

        let mut trigger = TriggerDefinition::period(60_000.0);
        trigger.name = Some("minutely".into());
        trigger.payload.insert("region", "eu");
        engine.schedule(&job("a", vec![trigger])).unwrap();

        engine.tick(Utc::now());

        match rx.try_recv().unwrap() {
            EngineEvent::Fired(fired) => {
                assert_eq!(fired.handle.code, "a");
                assert_eq!(fired.trigger.name, "minutely");
                assert_eq!(fired.trigger_payload.get::<String>("region").as_deref(), Some("eu"));
            }
            other => panic!("expected a firing, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn one_time_job_fires_once_then_reports_exhaustion() {
        let (engine, mut rx) = engine();
        engine
            .schedule(&job("once", vec![TriggerDefinition::one_time(None)]))
            .unwrap();

        let now = Utc::now();
        engine.tick(now);

        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Fired(_)));
        match rx.try_recv().unwrap() {
            EngineEvent::Exhausted { handle } => assert_eq!(handle.code, "once"),
            other => panic!("expected exhaustion, got {other:?}"),
        }

        // the job stays registered until reconciliation removes it
        assert_eq!(engine.job_count(), 1);

        // and a later tick emits nothing further
        engine.tick(now + Duration::seconds(5));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn fixed_rate_keeps_firing_on_cadence() {
        let (engine, mut rx) = engine();
        engine
            .schedule(&job("a", vec![TriggerDefinition::period(60_000.0)]))
            .unwrap();

        let now = Utc::now();
        engine.tick(now);
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Fired(_)));

        // nothing due half a minute in
        engine.tick(now + Duration::seconds(30));
        assert!(rx.try_recv().is_err());

        // due again after the full period
        engine.tick(now + Duration::seconds(61));
        assert!(matches!(rx.try_recv().unwrap(), EngineEvent::Fired(_)));
    }
}
