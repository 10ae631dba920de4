//! `jobgrid-worker` — the worker-side scheduling runtime.
//!
//! # Overview
//!
//! A worker process holds an in-memory schedule of the jobs the controller
//! assigned to it and keeps that schedule converged via periodic status
//! exchange. The moving parts, leaf-first:
//!
//! | Component            | Module         | Role                                         |
//! |----------------------|----------------|----------------------------------------------|
//! | Trigger compiler     | [`compile`]    | `TriggerDefinition` → concrete schedule entries |
//! | Registry + engine    | [`engine`]     | schedule/reschedule/unschedule, 1 s tick loop |
//! | Execution bridge     | [`bridge`]     | fired entries → executor runs → iteration reports |
//! | Reconciliation client| [`reconcile`]  | snapshot → exchange → apply added/updated/removed |
//! | Agent reporter       | [`agent`]      | registration with retries, heartbeat loop    |
//! | Supervisor           | [`supervisor`] | push-side consumer of fan-out updates        |
//!
//! Scheduling mutations serialise on one engine-wide lock; executions run
//! concurrently outside it, bounded only by the configured parallelism. An
//! execution in flight when its job is unscheduled completes normally.

pub mod agent;
pub mod bridge;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod executor;
pub mod reconcile;
pub mod registry;
pub mod supervisor;

pub use agent::{register_with_retries, AgentReporter};
pub use bridge::ExecutionBridge;
pub use compile::{compile_triggers, FirePolicy, ScheduleEntry, TriggerKey, TriggerZone};
pub use config::WorkerConfig;
pub use engine::{EngineEvent, FiredEntry, WorkerEngine};
pub use error::{Result, WorkerError};
pub use executor::{ExecutionFailure, ExecutorContext, ExecutorRegistry, JobExecutor};
pub use reconcile::ReconcileClient;
pub use registry::{JobHandle, JobKey};
pub use supervisor::WorkerSupervisor;
