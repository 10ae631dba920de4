use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use jobgrid_model::PayloadMap;

use crate::registry::JobHandle;

/// An expected, reportable execution failure.
///
/// This is the business-failure signal — it becomes a FAILURE iteration
/// with `message` attached and never crashes the worker. True runtime
/// faults have no business being funneled through it.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ExecutionFailure {
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// One runnable job implementation.
///
/// Returning `Ok` records a SUCCESS iteration; returning an
/// [`ExecutionFailure`] records a FAILURE one.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, ctx: &ExecutorContext) -> std::result::Result<(), ExecutionFailure>;
}

/// Factory producing an executor per firing.
pub type ExecutorFactory = dyn Fn(&ExecutorContext) -> Box<dyn JobExecutor> + Send + Sync;

/// Type-keyed table of executor factories.
///
/// An explicit object with shared ownership, scoped to the worker process —
/// the bridge looks a factory up at fire time, and a type with no factory
/// fails that execution (never the worker). Registration typically happens
/// once during bootstrap, lookups happen concurrently from executions.
#[derive(Default)]
pub struct ExecutorRegistry {
    factories: DashMap<String, Arc<ExecutorFactory>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `job_type`, replacing any previous one.
    pub fn register<F>(&self, job_type: impl Into<String>, factory: F)
    where
        F: Fn(&ExecutorContext) -> Box<dyn JobExecutor> + Send + Sync + 'static,
    {
        let job_type = job_type.into();
        info!(job_type = %job_type, "executor registered");
        self.factories.insert(job_type, Arc::new(factory));
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<ExecutorFactory>> {
        self.factories.get(job_type).map(|entry| entry.value().clone())
    }

    /// The job types this worker can execute, sorted.
    pub fn types(&self) -> BTreeSet<String> {
        self.factories.iter().map(|entry| entry.key().clone()).collect()
    }
}

/// Everything an executor may ask about the firing that invoked it.
///
/// Key-value lookups come in three scopes: job, trigger, and merged —
/// where merged means two sequential lookups with the trigger winning.
pub struct ExecutorContext {
    handle: Arc<JobHandle>,
    trigger_payload: PayloadMap,
    output: Mutex<Option<PayloadMap>>,
}

impl ExecutorContext {
    pub fn new(handle: Arc<JobHandle>, trigger_payload: PayloadMap) -> Self {
        Self {
            handle,
            trigger_payload,
            output: Mutex::new(None),
        }
    }

    pub fn code(&self) -> &str {
        &self.handle.code
    }

    pub fn group(&self) -> &str {
        &self.handle.group
    }

    pub fn job_type(&self) -> &str {
        &self.handle.job_type
    }

    pub fn cluster(&self) -> &str {
        &self.handle.cluster
    }

    /// Typed lookup in the job-scope payload only.
    pub fn job_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.handle.payload.get(key)
    }

    /// Typed lookup in the trigger-scope payload only.
    pub fn trigger_value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.trigger_payload.get(key)
    }

    /// Merged lookup: trigger scope first, then job scope.
    pub fn value<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.trigger_value(key).or_else(|| self.job_value(key))
    }

    /// Merged lookup with a fallback default.
    pub fn value_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.value(key).unwrap_or(default)
    }

    /// Set the result payload recorded on the iteration.
    pub fn set_output(&self, payload: PayloadMap) {
        *self.output.lock().unwrap() = Some(payload);
    }

    /// Consume the output; called by the bridge after execution.
    pub fn take_output(&self) -> Option<PayloadMap> {
        self.output.lock().unwrap().take()
    }
}
