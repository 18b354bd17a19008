//! Job identity and lifecycle status.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

use crate::JobOutputResult;

/// Unique identifier for a job, using ULID for chronological sorting.
///
/// Assigned by the persistence layer when a request is first stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Ulid);

impl JobId {
    /// Create a new unique job ID.
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Parse a job ID from a string.
    pub fn parse(s: &str) -> Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a job.
///
/// `Submitted` is the only initial state. `Finished`, `FatalError` and
/// `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    /// Accepted and waiting for a free execution slot.
    Submitted,
    /// Handed to the executor.
    Running,
    /// Executor finished and every required output was present.
    Finished,
    /// Execution or output handling failed.
    FatalError,
    /// Execution was cancelled.
    Aborted,
}

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Submitted,
        JobStatus::Running,
        JobStatus::Finished,
        JobStatus::FatalError,
        JobStatus::Aborted,
    ];

    /// Check if the job is in a terminal state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Finished | JobStatus::FatalError | JobStatus::Aborted
        )
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Submitted, JobStatus::Running)
                | (
                    JobStatus::Running,
                    JobStatus::Finished | JobStatus::FatalError | JobStatus::Aborted
                )
        )
    }

    /// Map a process exit code onto a terminal status.
    ///
    /// 130 and 143 are the shell conventions for SIGINT and SIGTERM.
    pub fn from_exit_code(code: i32) -> Self {
        match code {
            0 => JobStatus::Finished,
            130 | 143 => JobStatus::Aborted,
            _ => JobStatus::FatalError,
        }
    }

    /// Exit code a command-line front end should return for this status.
    pub fn to_exit_code(self) -> i32 {
        match self {
            JobStatus::Finished => 0,
            JobStatus::Aborted => 130,
            _ => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Submitted => "SUBMITTED",
            JobStatus::Running => "RUNNING",
            JobStatus::Finished => "FINISHED",
            JobStatus::FatalError => "FATAL_ERROR",
            JobStatus::Aborted => "ABORTED",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status: {0}")]
pub struct StatusParseError(pub String);

impl std::str::FromStr for JobStatus {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| StatusParseError(s.to_string()))
    }
}

/// Which console stream of a job some bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputChannel {
    Stdout,
    Stderr,
}

impl OutputChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            OutputChannel::Stdout => "stdout",
            OutputChannel::Stderr => "stderr",
        }
    }
}

impl std::fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a caller's promise resolves with once a job is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizedJob {
    pub job_id: JobId,
    pub final_status: JobStatus,
    pub message: String,
    /// One entry per declared expected output, in declaration order.
    #[serde(default)]
    pub outputs: Vec<JobOutputResult>,
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn only_forward_transitions_are_legal() {
        use JobStatus::*;

        assert!(Submitted.can_transition_to(Running));
        assert!(Running.can_transition_to(Finished));
        assert!(Running.can_transition_to(FatalError));
        assert!(Running.can_transition_to(Aborted));

        assert!(!Submitted.can_transition_to(Finished));
        assert!(!Submitted.can_transition_to(Aborted));
        assert!(!Running.can_transition_to(Submitted));
        for terminal in [Finished, FatalError, Aborted] {
            assert!(terminal.is_terminal());
            for next in JobStatus::ALL {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn exit_codes_map_to_statuses() {
        assert_eq!(JobStatus::from_exit_code(0), JobStatus::Finished);
        assert_eq!(JobStatus::from_exit_code(1), JobStatus::FatalError);
        assert_eq!(JobStatus::from_exit_code(143), JobStatus::Aborted);
        assert_eq!(JobStatus::from_exit_code(130), JobStatus::Aborted);
        assert_eq!(JobStatus::Finished.to_exit_code(), 0);
        assert_eq!(JobStatus::FatalError.to_exit_code(), 1);
    }

    #[test]
    fn status_uses_screaming_snake_case() {
        let json = serde_json::to_string(&JobStatus::FatalError).unwrap();
        assert_eq!(json, "\"FATAL_ERROR\"");
        assert_eq!("fatal_error".parse::<JobStatus>(), Ok(JobStatus::FatalError));
        assert!("DONE".parse::<JobStatus>().is_err());
    }

    #[test]
    fn job_id_round_trips_through_display() {
        let id = JobId::new();
        assert_eq!(JobId::parse(&id.to_string()).unwrap(), id);
    }
}
