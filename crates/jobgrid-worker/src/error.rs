use thiserror::Error;

use jobgrid_channel::ChannelError;

/// Errors that can occur within the worker runtime.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reschedule or unschedule targeted a job the engine does not hold.
    #[error("Job is not scheduled: {code} ({group})")]
    NotScheduled { code: String, group: String },

    /// The controller channel rejected a call.
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Agent registration kept failing; the worker cannot come up.
    #[error("Agent registration failed after {tries} tries")]
    Registration { tries: u32 },
}

pub type Result<T> = std::result::Result<T, WorkerError>;
