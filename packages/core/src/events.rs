//! Event types for real-time status updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{JobId, JobStatus};

/// A single status transition of a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: JobId,
    pub new_status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: JobId, new_status: JobStatus, message: impl Into<String>) -> Self {
        Self {
            job_id,
            new_status,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.new_status.is_terminal()
    }

    /// Get a human-readable description of the event.
    pub fn description(&self) -> String {
        format!("Job {} {}: {}", self.job_id, self.new_status, self.message)
    }
}
