//! `jobgrid-controller` — the controller-side scheduler state machine.
//!
//! # Overview
//!
//! [`SchedulerController`] owns the three repositories (jobs, iterations,
//! agents) and implements the worker-facing
//! [`SchedulerChannel`](jobgrid_channel::SchedulerChannel), plus the
//! management surface an operator API would sit on (add/update/delete jobs,
//! iteration history, agent fleet views).
//!
//! Two pieces of logic carry the weight here:
//!
//! * the **status exchange** — a set-diff between a worker's reported state
//!   and the currently ACTIVE jobs of a (cluster, group, type) slice;
//! * the **notification rule** — which fan-out message (ADD / UPDATE /
//!   REMOVE) a status transition emits, derived purely from the previous
//!   and new ACTIVE-ness of the record.

pub mod controller;

pub use controller::SchedulerController;
