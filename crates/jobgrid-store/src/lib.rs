//! `jobgrid-store` — repository traits and backends for scheduler state.
//!
//! # Overview
//!
//! The controller persists three record families: [`JobDefinition`]s,
//! [`JobIteration`]s, and [`AgentDefinition`]s. Each family has a sync
//! trait ([`JobStore`], [`IterationStore`], [`AgentStore`]) with two
//! shipped backends:
//!
//! | Backend  | Module     | Use                                    |
//! |----------|------------|----------------------------------------|
//! | Memory   | [`memory`] | Tests and embedded single-process runs |
//! | SQLite   | [`sqlite`] | Durable single-node deployments        |
//!
//! The SQLite backend keeps the full record as a JSON column next to the
//! columns it filters on, so the schema never chases the model.
//!
//! [`JobDefinition`]: jobgrid_model::JobDefinition
//! [`JobIteration`]: jobgrid_model::JobIteration
//! [`AgentDefinition`]: jobgrid_model::AgentDefinition

pub mod db;
pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::{MemoryAgentStore, MemoryIterationStore, MemoryJobStore};
pub use sqlite::{open_shared, SqliteAgentStore, SqliteIterationStore, SqliteJobStore};
pub use traits::{AgentStore, IterationStore, JobStore};
