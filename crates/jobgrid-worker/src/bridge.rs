use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, warn};

use jobgrid_channel::SchedulerChannel;
use jobgrid_model::{IterationStatus, JobIteration, JobStatus};

use crate::engine::{EngineEvent, FiredEntry};
use crate::executor::{ExecutionFailure, ExecutorContext, ExecutorRegistry};
use crate::registry::JobHandle;

/// Bridges fired schedule entries into executor invocations and feeds the
/// outcome back to the controller as iterations.
///
/// Executions run concurrently up to the configured parallelism, outside
/// the engine lock. Iteration reporting is fire-and-forget relative to the
/// execution itself: a failed report is logged and never retried.
pub struct ExecutionBridge {
    executors: Arc<ExecutorRegistry>,
    channel: Arc<dyn SchedulerChannel>,
    permits: Arc<Semaphore>,
}

impl ExecutionBridge {
    pub fn new(
        executors: Arc<ExecutorRegistry>,
        channel: Arc<dyn SchedulerChannel>,
        parallelism: usize,
    ) -> Self {
        Self {
            executors,
            channel,
            permits: Arc::new(Semaphore::new(parallelism.max(1))),
        }
    }

    /// Consume engine events until the channel closes.
    ///
    /// Firings spawn onto the runtime once a parallelism permit is free;
    /// exhaustions mark the job COMPLETED on the controller.
    pub async fn run(&self, mut events: mpsc::Receiver<EngineEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                EngineEvent::Fired(fired) => {
                    let permit = match self.permits.clone().acquire_owned().await {
                        Ok(permit) => permit,
                        // semaphore closed: the bridge is going away
                        Err(_) => return,
                    };
                    let executors = self.executors.clone();
                    let channel = self.channel.clone();
                    tokio::spawn(async move {
                        execute_one(executors, channel, fired).await;
                        drop(permit);
                    });
                }
                EngineEvent::Exhausted { handle } => {
                    self.report_completed(handle).await;
                }
            }
        }
    }

    /// Run exactly one fired entry to completion. Exposed for tests; `run`
    /// drives it through spawned tasks.
    pub async fn execute_now(&self, fired: FiredEntry) {
        execute_one(self.executors.clone(), self.channel.clone(), fired).await;
    }

    /// Tell the controller a job's triggers are all exhausted.
    pub async fn report_completed(&self, handle: Arc<JobHandle>) {
        match self.channel.mark_as(&handle.id, JobStatus::Completed).await {
            Ok(Some(_)) => {
                debug!(code = %handle.code, group = %handle.group, "job marked completed");
            }
            Ok(None) => {
                warn!(code = %handle.code, group = %handle.group, "job completion not recorded, definition missing");
            }
            Err(e) => {
                warn!(code = %handle.code, group = %handle.group, error = %e, "job completion not recorded");
            }
        }
    }
}

async fn execute_one(
    executors: Arc<ExecutorRegistry>,
    channel: Arc<dyn SchedulerChannel>,
    fired: FiredEntry,
) {
    let handle = fired.handle;
    let ctx = ExecutorContext::new(handle.clone(), fired.trigger_payload);
    let started = Instant::now();

    // a missing factory fails this execution, never the worker
    let result = match executors.get(&handle.job_type) {
        Some(factory) => {
            let executor = factory(&ctx);
            executor.execute(&ctx).await
        }
        None => Err(ExecutionFailure::new(format!(
            "no executor registered for type '{}'",
            handle.job_type
        ))),
    };
    let runtime_ms = started.elapsed().as_millis() as u64;

    let status = if result.is_ok() {
        IterationStatus::Success
    } else {
        IterationStatus::Failure
    };
    debug!(
        code = %handle.code,
        group = %handle.group,
        trigger = %fired.trigger,
        %status,
        runtime_ms,
        "job executed"
    );

    // deliberate suppression for high-frequency/low-value jobs
    if handle.execution.silent_iterations {
        return;
    }

    let iteration = JobIteration {
        id: None,
        job_id: handle.id.clone(),
        status,
        payload: ctx.take_output(),
        message: result.err().map(|e| e.message),
        runtime_ms,
        timestamp: Utc::now(),
    };

    if let Err(e) = channel.iterate(iteration).await {
        warn!(
            code = %handle.code,
            group = %handle.group,
            error = %e,
            "could not record iteration"
        );
    }
}
