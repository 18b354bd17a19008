//! Local executor configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ExecutorError;

const DEFAULT_WORKING_DIRS: &str = "./wds";
const DEFAULT_KILL_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalExecutorConfig {
    /// Root under which one directory per job is created.
    pub working_dirs: PathBuf,

    /// How long an aborted job gets to exit after SIGTERM before it is
    /// killed outright.
    pub delay_before_forcibly_killing: Duration,

    /// Delete a job's working directory once its outputs are collected.
    pub remove_after_execution: bool,
}

impl Default for LocalExecutorConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WORKING_DIRS)
    }
}

impl LocalExecutorConfig {
    pub fn new(working_dirs: impl Into<PathBuf>) -> Self {
        Self {
            working_dirs: working_dirs.into(),
            delay_before_forcibly_killing: DEFAULT_KILL_DELAY,
            remove_after_execution: false,
        }
    }

    pub fn with_kill_delay(mut self, delay: Duration) -> Self {
        self.delay_before_forcibly_killing = delay;
        self
    }

    pub fn remove_after_execution(mut self, remove: bool) -> Self {
        self.remove_after_execution = remove;
        self
    }

    /// Creates configuration from environment variables
    ///
    /// - JOBS_WORKING_DIRS (optional, default: ./wds)
    /// - JOBS_KILL_DELAY_MS (optional, milliseconds, default: 1000)
    /// - JOBS_REMOVE_WORKING_DIRS (optional, true/false, default: false)
    pub fn from_env() -> Result<Self, ExecutorError> {
        let working_dirs = std::env::var("JOBS_WORKING_DIRS")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WORKING_DIRS));

        let delay_before_forcibly_killing = match std::env::var("JOBS_KILL_DELAY_MS") {
            Ok(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .map_err(|e| {
                    ExecutorError::InvalidConfig(format!("JOBS_KILL_DELAY_MS={raw}: {e}"))
                })?,
            Err(_) => DEFAULT_KILL_DELAY,
        };

        let remove_after_execution = match std::env::var("JOBS_REMOVE_WORKING_DIRS") {
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                ExecutorError::InvalidConfig(format!(
                    "JOBS_REMOVE_WORKING_DIRS={raw}: expected true or false"
                ))
            })?,
            Err(_) => false,
        };

        let config = Self {
            working_dirs,
            delay_before_forcibly_killing,
            remove_after_execution,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ExecutorError> {
        if self.working_dirs.as_os_str().is_empty() {
            return Err(ExecutorError::InvalidConfig(
                "working_dirs cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
