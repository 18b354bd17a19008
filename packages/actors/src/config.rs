//! Job manager configuration.

use crate::messages::ManagerError;

const DEFAULT_MAX_RUNNING_JOBS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobManagerConfig {
    /// How many jobs may be with the executor at once. Further jobs wait in
    /// submission order.
    pub max_running_jobs: usize,
}

impl Default for JobManagerConfig {
    fn default() -> Self {
        Self {
            max_running_jobs: DEFAULT_MAX_RUNNING_JOBS,
        }
    }
}

impl JobManagerConfig {
    pub fn new(max_running_jobs: usize) -> Self {
        Self { max_running_jobs }
    }

    /// Creates configuration from environment variables
    ///
    /// - JOBS_MAX_RUNNING_JOBS (optional, default: 10)
    pub fn from_env() -> Result<Self, ManagerError> {
        let max_running_jobs = match std::env::var("JOBS_MAX_RUNNING_JOBS") {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                ManagerError::InvalidConfig(format!("JOBS_MAX_RUNNING_JOBS={raw}: {e}"))
            })?,
            Err(_) => DEFAULT_MAX_RUNNING_JOBS,
        };

        let config = Self { max_running_jobs };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.max_running_jobs == 0 {
            return Err(ManagerError::InvalidConfig(
                "max_running_jobs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
