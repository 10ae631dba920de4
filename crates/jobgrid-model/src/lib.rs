//! `jobgrid-model` — shared data model for the jobgrid scheduler.
//!
//! # Overview
//!
//! Everything the controller and workers exchange lives here: durable
//! [`JobDefinition`]s with their declarative [`TriggerDefinition`]s,
//! [`AgentDefinition`] registrations, immutable [`JobIteration`] execution
//! records, and the request/response messages of the status-exchange
//! protocol.
//!
//! # Trigger variants
//!
//! | Variant   | Behaviour                                         |
//! |-----------|---------------------------------------------------|
//! | `Period`  | Fixed-rate repetition, period given in milliseconds |
//! | `Cron`    | Cron expression with optional timezone            |
//! | `OneTime` | Single fire at `start_at`, or immediately         |

pub mod agent;
pub mod exchange;
pub mod iteration;
pub mod job;
pub mod payload;
pub mod trigger;

pub use agent::{AgentActivity, AgentDefinition, AgentHealth};
pub use exchange::{MetadataRequest, MetadataResponse, StatusExchangeRequest, StatusExchangeResponse};
pub use iteration::{IterationPage, IterationStatus, JobIteration};
pub use job::{ExecutionOptions, JobDefinition, JobPage, JobStatus};
pub use payload::PayloadMap;
pub use trigger::{TriggerDefinition, TriggerRule};
