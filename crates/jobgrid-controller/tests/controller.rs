// Covers the notification rule (one message per ACTIVE-ness transition
// class), the status-exchange set-diff, and the agent upsert semantics.

use std::sync::{Arc, Mutex};

use chrono::Utc;

use jobgrid_channel::{
    ChannelError, SchedulerChannel, UpdateOperation, WorkerPublisher, WorkerUpdate,
};
use jobgrid_controller::SchedulerController;
use jobgrid_model::{
    AgentActivity, AgentDefinition, AgentHealth, ExecutionOptions, IterationStatus, JobDefinition,
    JobIteration, JobStatus, MetadataRequest, PayloadMap, StatusExchangeRequest,
};
use jobgrid_store::{MemoryAgentStore, MemoryIterationStore, MemoryJobStore};

/// Publisher that records everything it sees.
#[derive(Default)]
struct RecordingPublisher {
    updates: Mutex<Vec<WorkerUpdate>>,
}

impl RecordingPublisher {
    fn take(&self) -> Vec<WorkerUpdate> {
        std::mem::take(&mut *self.updates.lock().unwrap())
    }
}

impl WorkerPublisher for RecordingPublisher {
    fn publish(&self, update: &WorkerUpdate) -> jobgrid_channel::Result<()> {
        self.updates.lock().unwrap().push(update.clone());
        Ok(())
    }
}

/// Publisher that always fails.
struct BrokenPublisher;

impl WorkerPublisher for BrokenPublisher {
    fn publish(&self, _update: &WorkerUpdate) -> jobgrid_channel::Result<()> {
        Err(ChannelError::Publish("wire down".into()))
    }
}

fn controller() -> (SchedulerController, Arc<RecordingPublisher>) {
    let recorder = Arc::new(RecordingPublisher::default());
    let mut controller = SchedulerController::new(
        Arc::new(MemoryJobStore::new()),
        Arc::new(MemoryIterationStore::new()),
        Arc::new(MemoryAgentStore::new()),
    );
    controller.add_publisher(recorder.clone());
    (controller, recorder)
}

fn job(code: &str, status: JobStatus) -> JobDefinition {
    JobDefinition {
        id: String::new(),
        code: code.into(),
        group: "g".into(),
        job_type: "report".into(),
        cluster: "main".into(),
        status,
        triggers: Vec::new(),
        execution: ExecutionOptions::default(),
        selectors: Default::default(),
        payload: PayloadMap::new(),
        extra: PayloadMap::new(),
        created_by: None,
        modified_by: None,
        created: None,
        modified: None,
    }
}

fn exchange_request(state: &[(&str, chrono::DateTime<Utc>)]) -> StatusExchangeRequest {
    StatusExchangeRequest {
        cluster: "main".into(),
        group: "g".into(),
        job_type: "report".into(),
        state: state
            .iter()
            .map(|(code, ts)| (code.to_string(), *ts))
            .collect(),
    }
}

#[tokio::test]
async fn active_to_active_update_emits_one_update_with_definition() {
    let (controller, recorder) = controller();
    let inserted = controller.add_job(job("a", JobStatus::Active)).unwrap();
    recorder.take();

    let mut changed = inserted.clone();
    changed.payload.insert("retries", 5);
    let updated = controller.update_job(changed).unwrap().unwrap();

    let updates = recorder.take();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, UpdateOperation::Update);
    assert_eq!(updates[0].definition.as_ref().unwrap(), &updated);
}

#[tokio::test]
async fn active_to_inactive_emits_one_remove_without_definition() {
    let (controller, recorder) = controller();
    let inserted = controller.add_job(job("a", JobStatus::Active)).unwrap();
    recorder.take();

    controller
        .mark_as(&inserted.id, JobStatus::Paused)
        .await
        .unwrap()
        .unwrap();

    let updates = recorder.take();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, UpdateOperation::Remove);
    assert!(updates[0].definition.is_none());
    assert_eq!(updates[0].code, "a");
}

#[tokio::test]
async fn inactive_to_active_emits_one_add_with_definition() {
    let (controller, recorder) = controller();
    let inserted = controller.add_job(job("a", JobStatus::Defined)).unwrap();
    // a DEFINED insert publishes nothing
    assert!(recorder.take().is_empty());

    let activated = controller
        .mark_as(&inserted.id, JobStatus::Active)
        .await
        .unwrap()
        .unwrap();

    let updates = recorder.take();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, UpdateOperation::Add);
    assert_eq!(updates[0].definition.as_ref().unwrap(), &activated);
}

#[tokio::test]
async fn inactive_to_inactive_emits_nothing() {
    let (controller, recorder) = controller();
    let inserted = controller.add_job(job("a", JobStatus::Defined)).unwrap();

    controller
        .mark_as(&inserted.id, JobStatus::Paused)
        .await
        .unwrap()
        .unwrap();

    assert!(recorder.take().is_empty());
}

#[tokio::test]
async fn active_insert_emits_add_and_delete_emits_remove() {
    let (controller, recorder) = controller();
    let inserted = controller.add_job(job("a", JobStatus::Active)).unwrap();

    let updates = recorder.take();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, UpdateOperation::Add);

    controller.delete_job(&inserted.id).unwrap().unwrap();
    let updates = recorder.take();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].operation, UpdateOperation::Remove);
    assert!(updates[0].definition.is_none());
}

#[tokio::test]
async fn broken_publisher_does_not_block_persistence_or_later_publishers() {
    let recorder = Arc::new(RecordingPublisher::default());
    let mut controller = SchedulerController::new(
        Arc::new(MemoryJobStore::new()),
        Arc::new(MemoryIterationStore::new()),
        Arc::new(MemoryAgentStore::new()),
    );
    controller.add_publisher(Arc::new(BrokenPublisher));
    controller.add_publisher(recorder.clone());

    let inserted = controller.add_job(job("a", JobStatus::Active)).unwrap();

    // persisted despite the first publisher failing
    assert!(controller.get_job(&inserted.id).unwrap().is_some());
    // and the second publisher still saw the update
    assert_eq!(recorder.take().len(), 1);
}

#[tokio::test]
async fn status_exchange_partitions_added_updated_removed() {
    let (controller, _) = controller();

    let fresh = controller.add_job(job("fresh", JobStatus::Active)).unwrap();
    let stale = controller.add_job(job("stale", JobStatus::Active)).unwrap();
    let same = controller.add_job(job("same", JobStatus::Active)).unwrap();
    // a paused job is invisible to the exchange
    controller.add_job(job("paused", JobStatus::Paused)).unwrap();

    // bump "stale" so its stored modified is newer than the worker's
    let stale_known = stale.modified.unwrap();
    controller.update_job(stale.clone()).unwrap().unwrap();

    let response = controller
        .status_exchange(exchange_request(&[
            ("stale", stale_known),
            ("same", same.modified.unwrap()),
            ("gone", Utc::now()),
        ]))
        .await
        .unwrap();

    assert_eq!(response.added.len(), 1);
    assert!(response.added.contains_key("fresh"));
    assert_eq!(response.added["fresh"], fresh);

    assert_eq!(response.updated.len(), 1);
    assert!(response.updated.contains_key("stale"));

    assert_eq!(response.removed, vec!["gone".to_string()]);
}

#[tokio::test]
async fn status_exchange_clock_skew_is_a_no_op() {
    let (controller, _) = controller();
    let job = controller.add_job(job("a", JobStatus::Active)).unwrap();

    // worker claims a modification time *newer* than the stored one
    let skewed = job.modified.unwrap() + chrono::Duration::seconds(30);
    let response = controller
        .status_exchange(exchange_request(&[("a", skewed)]))
        .await
        .unwrap();

    assert!(response.is_empty());
}

#[tokio::test]
async fn status_exchange_reaches_a_fixed_point() {
    let (controller, _) = controller();
    controller.add_job(job("a", JobStatus::Active)).unwrap();
    controller.add_job(job("b", JobStatus::Active)).unwrap();

    // first exchange from an empty worker: everything is added
    let first = controller
        .status_exchange(exchange_request(&[]))
        .await
        .unwrap();
    assert_eq!(first.added.len(), 2);

    // apply the result and exchange again: nothing left to do
    let state: Vec<(&str, chrono::DateTime<Utc>)> = first
        .added
        .iter()
        .map(|(code, def)| (code.as_str(), def.modified.unwrap()))
        .collect();
    let second = controller
        .status_exchange(exchange_request(&state))
        .await
        .unwrap();
    assert!(second.is_empty());
}

#[tokio::test]
async fn metadata_returns_distinct_groups_and_types() {
    let (controller, _) = controller();
    let mut other = job("x", JobStatus::Defined);
    other.group = "g2".into();
    other.job_type = "sync".into();
    controller.add_job(job("a", JobStatus::Defined)).unwrap();
    controller.add_job(other).unwrap();

    let meta = controller
        .metadata(MetadataRequest {
            cluster: "main".into(),
        })
        .await
        .unwrap();

    assert_eq!(meta.groups, vec!["g", "g2"]);
    assert_eq!(meta.types, vec!["report", "sync"]);
}

#[tokio::test]
async fn iterate_assigns_id_and_cleanup_is_bounded() {
    let (controller, _) = controller();

    let recorded = controller
        .iterate(JobIteration {
            id: None,
            job_id: "j-1".into(),
            status: IterationStatus::Success,
            payload: None,
            message: None,
            runtime_ms: 12,
            timestamp: Utc::now() - chrono::Duration::minutes(10),
        })
        .await
        .unwrap();
    assert!(recorded.id.is_some());

    let removed = controller
        .cleanup_iterations(Utc::now() - chrono::Duration::minutes(5))
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn heartbeat_on_unknown_agent_is_a_no_op() {
    let (controller, _) = controller();

    let result = controller
        .heartbeat("ghost", AgentHealth::now(AgentActivity::Heartbeat))
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn registration_upserts_and_heartbeat_replaces_health() {
    let (controller, _) = controller();

    let agent = AgentDefinition {
        id: "a-1".into(),
        cluster: "main".into(),
        worker: "w-1".into(),
        name: "worker one".into(),
        health: Some(AgentHealth::now(AgentActivity::Register)),
        heartbeat_freq_ms: 30_000,
        registered: Utc::now(),
    };
    controller.registration(agent.clone()).await.unwrap();
    // re-registration overwrites rather than failing
    controller.registration(agent).await.unwrap();

    let beat = AgentHealth::now(AgentActivity::Heartbeat);
    let after = controller
        .heartbeat("a-1", beat.clone())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(after.health.unwrap().last_activity, AgentActivity::Heartbeat);

    assert_eq!(controller.get_agents().unwrap().len(), 1);
    assert!(controller.delete_agent("a-1").unwrap().is_some());
}

#[tokio::test]
async fn mark_as_on_unknown_id_returns_none() {
    let (controller, _) = controller();
    let result = controller
        .mark_as("missing", JobStatus::Active)
        .await
        .unwrap();
    assert!(result.is_none());
}
