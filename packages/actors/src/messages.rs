//! Message and error types for the job manager actor.

use bytes::Bytes;
use job_core::{FinalizedJob, JobExecutionResult, JobId, JobRequest, OutputChannel};
use ractor::RpcReplyPort;
use thiserror::Error;

use crate::executor::JobEventListeners;
use crate::promise::{CancellablePromise, PromiseError};
use crate::stream::Subscription;

/// What `submit` hands back: the canonical id and a promise for the outcome.
pub type Submission = (JobId, CancellablePromise<FinalizedJob>);

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("Failed to persist job request: {0}")]
    Persistence(#[from] db::DbError),
    #[error("Job manager is not running: {0}")]
    Unavailable(String),
    #[error("Invalid job manager configuration: {0}")]
    InvalidConfig(String),
    #[error("Failed to start job manager: {0}")]
    Spawn(String),
}

/// Snapshot of the manager's job table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ManagerStats {
    /// Jobs waiting for a free slot.
    pub pending: usize,
    /// Jobs currently with the executor.
    pub running: usize,
    pub max_running_jobs: usize,
}

impl ManagerStats {
    pub fn tracked(&self) -> usize {
        self.pending + self.running
    }
}

/// Messages for the JobManagerActor.
pub enum ManagerMessage {
    /// Persist and enqueue a new job.
    Submit {
        request: Box<JobRequest>,
        listeners: JobEventListeners,
        reply: RpcReplyPort<Result<Submission, ManagerError>>,
    },

    /// An executor promise resolved (or was rejected).
    ExecutionFinished {
        job_id: JobId,
        outcome: Result<JobExecutionResult, PromiseError>,
    },

    /// Live stdout/stderr of an active job.
    ConsoleUpdates {
        job_id: JobId,
        channel: OutputChannel,
        reply: RpcReplyPort<Option<Subscription<Bytes>>>,
    },

    /// Abort a queued or running job.
    TryAbort {
        job_id: JobId,
        reply: RpcReplyPort<bool>,
    },

    /// The public promise of a job was cancelled by its holder.
    CancelRequested { job_id: JobId },

    /// Get job table stats.
    GetStats { reply: RpcReplyPort<ManagerStats> },

    /// Stop the manager, rejecting every unresolved promise.
    Shutdown,
}

impl std::fmt::Debug for ManagerMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ManagerMessage::Submit { request, .. } => {
                f.debug_struct("Submit").field("name", &request.name).finish()
            }
            ManagerMessage::ExecutionFinished { job_id, outcome } => f
                .debug_struct("ExecutionFinished")
                .field("job_id", job_id)
                .field("status", &outcome.as_ref().map(|r| r.final_status))
                .finish(),
            ManagerMessage::ConsoleUpdates {
                job_id, channel, ..
            } => f
                .debug_struct("ConsoleUpdates")
                .field("job_id", job_id)
                .field("channel", channel)
                .finish(),
            ManagerMessage::TryAbort { job_id, .. } => {
                f.debug_struct("TryAbort").field("job_id", job_id).finish()
            }
            ManagerMessage::CancelRequested { job_id } => f
                .debug_struct("CancelRequested")
                .field("job_id", job_id)
                .finish(),
            ManagerMessage::GetStats { .. } => f.write_str("GetStats"),
            ManagerMessage::Shutdown => f.write_str("Shutdown"),
        }
    }
}
