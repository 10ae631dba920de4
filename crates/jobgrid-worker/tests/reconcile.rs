// End-to-end convergence against a real controller over memory stores:
// activation flows to the worker, repeat exchanges reach a fixed point,
// pausing removes the job, and an exhausted one-time job completes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;

use jobgrid_channel::{BroadcastPublisher, SchedulerChannel};
use jobgrid_controller::SchedulerController;
use jobgrid_model::{
    ExecutionOptions, IterationStatus, JobDefinition, JobStatus, PayloadMap,
    StatusExchangeRequest, TriggerDefinition,
};
use jobgrid_store::{MemoryAgentStore, MemoryIterationStore, MemoryJobStore};
use jobgrid_worker::{
    EngineEvent, ExecutionBridge, ExecutionFailure, ExecutorContext, ExecutorRegistry,
    JobExecutor, ReconcileClient, WorkerEngine, WorkerSupervisor,
};

struct NoopExecutor;

#[async_trait]
impl JobExecutor for NoopExecutor {
    async fn execute(&self, _ctx: &ExecutorContext) -> Result<(), ExecutionFailure> {
        Ok(())
    }
}

struct Fixture {
    controller: Arc<SchedulerController>,
    channel: Arc<dyn SchedulerChannel>,
    engine: Arc<WorkerEngine>,
    events: mpsc::Receiver<EngineEvent>,
    publisher: Arc<BroadcastPublisher>,
}

fn fixture() -> Fixture {
    let publisher = Arc::new(BroadcastPublisher::new());
    let mut controller = SchedulerController::new(
        Arc::new(MemoryJobStore::new()),
        Arc::new(MemoryIterationStore::new()),
        Arc::new(MemoryAgentStore::new()),
    );
    controller.add_publisher(publisher.clone());
    let controller = Arc::new(controller);
    let channel: Arc<dyn SchedulerChannel> = controller.clone();

    let (tx, events) = mpsc::channel(64);
    let engine = Arc::new(WorkerEngine::new(tx));

    Fixture {
        controller,
        channel,
        engine,
        events,
        publisher,
    }
}

fn job(code: &str, status: JobStatus, triggers: Vec<TriggerDefinition>) -> JobDefinition {
    JobDefinition {
        id: String::new(),
        code: code.into(),
        group: "g".into(),
        job_type: "report".into(),
        cluster: "main".into(),
        status,
        triggers,
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

fn client(fixture: &Fixture) -> ReconcileClient {
    ReconcileClient::new(
        fixture.engine.clone(),
        fixture.channel.clone(),
        "main",
        "g",
        "report",
    )
}

#[tokio::test]
async fn activation_flows_to_the_worker_and_reaches_a_fixed_point() {
    let fx = fixture();
    let client = client(&fx);

    // a DEFINED job is invisible to the worker
    let inserted = fx
        .controller
        .add_job(job("a", JobStatus::Defined, vec![TriggerDefinition::period(60_000.0)]))
        .unwrap();
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 0);

    // activating it delivers it on the next poll
    fx.controller
        .mark_as(&inserted.id, JobStatus::Active)
        .await
        .unwrap()
        .unwrap();
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 1);
    assert!(fx.engine.jobs_in_group("g").contains("a"));

    // the converged state exchanges to an empty diff
    let response = fx
        .channel
        .status_exchange(StatusExchangeRequest {
            cluster: "main".into(),
            group: "g".into(),
            job_type: "report".into(),
            state: fx.engine.snapshot("g", "report"),
        })
        .await
        .unwrap();
    assert!(response.is_empty());

    // and polling again changes nothing
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 1);
}

#[tokio::test]
async fn update_reschedules_and_pause_unschedules() {
    let fx = fixture();
    let client = client(&fx);

    let inserted = fx
        .controller
        .add_job(job("a", JobStatus::Active, vec![TriggerDefinition::period(60_000.0)]))
        .unwrap();
    client.poll_once().await.unwrap();
    let before = fx.engine.snapshot("g", "report")["a"];

    // an update while ACTIVE bumps modified; the worker picks it up
    let mut changed = fx.controller.get_job(&inserted.id).unwrap().unwrap();
    changed.payload.insert("retries", 5);
    fx.controller.update_job(changed).unwrap().unwrap();
    client.poll_once().await.unwrap();

    let after = fx.engine.snapshot("g", "report")["a"];
    assert!(after > before);

    // pausing removes it from the active set, so the worker drops it
    fx.controller
        .mark_as(&inserted.id, JobStatus::Paused)
        .await
        .unwrap()
        .unwrap();
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 0);
}

#[tokio::test]
async fn failed_exchange_leaves_local_state_unchanged() {
    let fx = fixture();
    let client = client(&fx);

    fx.controller
        .add_job(job("a", JobStatus::Active, vec![TriggerDefinition::period(60_000.0)]))
        .unwrap();
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 1);

    // a client pointed at a dead channel fails its poll but mutates nothing
    struct DeadChannel;
    #[async_trait]
    impl SchedulerChannel for DeadChannel {
        async fn metadata(
            &self,
            _request: jobgrid_model::MetadataRequest,
        ) -> jobgrid_channel::Result<jobgrid_model::MetadataResponse> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
        async fn status_exchange(
            &self,
            _request: StatusExchangeRequest,
        ) -> jobgrid_channel::Result<jobgrid_model::StatusExchangeResponse> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
        async fn iterate(
            &self,
            _iteration: jobgrid_model::JobIteration,
        ) -> jobgrid_channel::Result<jobgrid_model::JobIteration> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
        async fn mark_as(
            &self,
            _id: &str,
            _status: JobStatus,
        ) -> jobgrid_channel::Result<Option<JobDefinition>> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
        async fn registration(
            &self,
            _agent: jobgrid_model::AgentDefinition,
        ) -> jobgrid_channel::Result<jobgrid_model::AgentDefinition> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
        async fn heartbeat(
            &self,
            _id: &str,
            _health: jobgrid_model::AgentHealth,
        ) -> jobgrid_channel::Result<Option<jobgrid_model::AgentDefinition>> {
            Err(jobgrid_channel::ChannelError::Exchange("offline".into()))
        }
    }

    let offline = ReconcileClient::new(
        fx.engine.clone(),
        Arc::new(DeadChannel),
        "main",
        "g",
        "report",
    );
    assert!(offline.poll_once().await.is_err());
    assert_eq!(fx.engine.job_count(), 1);
}

#[tokio::test]
async fn push_updates_accelerate_without_polling() {
    let fx = fixture();
    let mut updates = fx.publisher.subscribe();
    let supervisor = WorkerSupervisor::new(fx.engine.clone(), ["g".to_string()]);

    let inserted = fx
        .controller
        .add_job(job("a", JobStatus::Active, vec![TriggerDefinition::period(60_000.0)]))
        .unwrap();

    // the ADD arrives on the broadcast side and schedules without a poll
    supervisor.apply(updates.try_recv().unwrap());
    assert_eq!(fx.engine.job_count(), 1);

    fx.controller
        .mark_as(&inserted.id, JobStatus::Paused)
        .await
        .unwrap()
        .unwrap();
    supervisor.apply(updates.try_recv().unwrap());
    assert_eq!(fx.engine.job_count(), 0);
}

#[tokio::test]
async fn exhausted_one_time_job_completes_and_converges_away() {
    let mut fx = fixture();
    let client = client(&fx);

    let executors = Arc::new(ExecutorRegistry::new());
    executors.register("report", |_| Box::new(NoopExecutor));
    let bridge = ExecutionBridge::new(executors, fx.channel.clone(), 4);

    let inserted = fx
        .controller
        .add_job(job("once", JobStatus::Active, vec![TriggerDefinition::one_time(None)]))
        .unwrap();
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 1);

    // the single fire and the exhaustion arrive in one tick
    fx.engine.tick(Utc::now());
    match fx.events.try_recv().unwrap() {
        EngineEvent::Fired(fired) => bridge.execute_now(fired).await,
        other => panic!("expected a firing, got {other:?}"),
    }
    match fx.events.try_recv().unwrap() {
        EngineEvent::Exhausted { handle } => bridge.report_completed(handle).await,
        other => panic!("expected exhaustion, got {other:?}"),
    }

    // the iteration landed and the job is COMPLETED on the controller
    let page = fx
        .controller
        .get_iterations(&inserted.id, Some(IterationStatus::Success), 0, 10)
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(
        fx.controller.get_job(&inserted.id).unwrap().unwrap().status,
        JobStatus::Completed
    );

    // no longer active: the next poll removes it locally
    client.poll_once().await.unwrap();
    assert_eq!(fx.engine.job_count(), 0);
}
