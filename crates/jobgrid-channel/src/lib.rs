//! `jobgrid-channel` — the contract between workers and the controller.
//!
//! # Overview
//!
//! [`SchedulerChannel`] is the RPC-shaped surface a worker talks to: pull
//! metadata, exchange scheduling state, report iterations, register and
//! heartbeat agents. The controller implements it directly for in-process
//! use; any transport layer can wrap it.
//!
//! The push side lives in [`notify`]: [`WorkerUpdate`] messages fan out to
//! registered [`WorkerPublisher`]s whenever a job's ACTIVE-ness changes.
//! Push delivery is best-effort acceleration only — the pull-based status
//! exchange remains the correctness backstop.

pub mod channel;
pub mod error;
pub mod notify;

pub use channel::SchedulerChannel;
pub use error::{ChannelError, Result};
pub use notify::{BroadcastPublisher, UpdateOperation, WorkerPublisher, WorkerUpdate};
