use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, WorkerError};

/// Cluster used when none is configured.
pub const DEFAULT_CLUSTER: &str = "DEFAULT_CLUSTER";
/// Concurrent executions per worker unless overridden.
pub const DEFAULT_PARALLELISM: usize = 4;
/// Status-exchange polling cadence (milliseconds).
pub const DEFAULT_POLLING_RATE_MS: u64 = 10_000;
/// Heartbeat cadence (milliseconds).
pub const DEFAULT_HEARTBEAT_RATE_MS: u64 = 30_000;
/// Registration attempts before the worker gives up starting.
pub const DEFAULT_REGISTRATION_TRIES: u32 = 3;

/// Worker configuration (jobgrid.toml + JOBGRID_* env overrides).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Name of this worker process; also the agent's worker identity.
    pub worker: String,
    #[serde(default = "default_cluster")]
    pub cluster: String,
    /// Upper bound on concurrently running executions.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// How often each (group, type) pair exchanges state, in milliseconds.
    #[serde(default = "default_polling_rate")]
    pub polling_rate_ms: u64,
    #[serde(default = "default_heartbeat_rate")]
    pub heartbeat_rate_ms: u64,
    #[serde(default = "default_registration_tries")]
    pub registration_tries: u32,
}

impl WorkerConfig {
    /// Load config from a TOML file with JOBGRID_* env var overrides.
    ///
    /// `path` defaults to `jobgrid.toml` in the working directory; a missing
    /// file is fine as long as the required keys arrive via environment.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let path = path.unwrap_or("jobgrid.toml");

        let config: WorkerConfig = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("JOBGRID_"))
            .extract()
            .map_err(|e| WorkerError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_cluster() -> String {
    DEFAULT_CLUSTER.to_string()
}
fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}
fn default_polling_rate() -> u64 {
    DEFAULT_POLLING_RATE_MS
}
fn default_heartbeat_rate() -> u64 {
    DEFAULT_HEARTBEAT_RATE_MS
}
fn default_registration_tries() -> u32 {
    DEFAULT_REGISTRATION_TRIES
}
