use thiserror::Error;

/// Errors that can cross the scheduler channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Underlying storage failed while serving the call.
    #[error("Storage error: {0}")]
    Store(String),

    /// Inserting a job would violate the unique ACTIVE (code, group) rule.
    #[error("Job conflict: an active '{code}' already exists in group '{group}'")]
    Conflict { code: String, group: String },

    /// A fan-out publisher rejected the update message.
    #[error("Publish error: {0}")]
    Publish(String),

    /// The status exchange could not be completed.
    #[error("Exchange error: {0}")]
    Exchange(String),
}

pub type Result<T> = std::result::Result<T, ChannelError>;
