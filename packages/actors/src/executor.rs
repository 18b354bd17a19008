//! The contract between the job manager and whatever actually runs a job.

use bytes::Bytes;
use job_core::{JobExecutionResult, PersistedJob};
use tokio::sync::mpsc::UnboundedSender;

use crate::promise::CancellablePromise;
use crate::stream::Topic;

/// Sinks an executor forwards a job's console output into.
#[derive(Debug, Clone, Default)]
pub struct ExecutionListeners {
    pub stdout: Topic<Bytes>,
    pub stderr: Topic<Bytes>,
}

impl ExecutionListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit_stdout(&self, chunk: Bytes) {
        self.stdout.publish(chunk);
    }

    pub fn emit_stderr(&self, chunk: Bytes) {
        self.stderr.publish(chunk);
    }
}

/// Runs jobs.
///
/// `execute` must return promptly; the work itself happens elsewhere and is
/// reported through the returned promise. Cancelling that promise asks the
/// executor to stop the job, after which it should still resolve it, usually
/// with `ABORTED`. Failing to run a job is reported as a resolution with
/// `FATAL_ERROR`, never by leaving the promise unresolved.
pub trait JobExecutor: Send + Sync + 'static {
    fn execute(
        &self,
        job: &PersistedJob,
        listeners: ExecutionListeners,
    ) -> CancellablePromise<JobExecutionResult>;
}

/// A simple function-based executor.
pub struct FnExecutor<F>
where
    F: Fn(&PersistedJob, ExecutionListeners) -> CancellablePromise<JobExecutionResult>
        + Send
        + Sync
        + 'static,
{
    execute: F,
}

impl<F> FnExecutor<F>
where
    F: Fn(&PersistedJob, ExecutionListeners) -> CancellablePromise<JobExecutionResult>
        + Send
        + Sync
        + 'static,
{
    pub fn new(execute: F) -> Self {
        Self { execute }
    }
}

impl<F> JobExecutor for FnExecutor<F>
where
    F: Fn(&PersistedJob, ExecutionListeners) -> CancellablePromise<JobExecutionResult>
        + Send
        + Sync
        + 'static,
{
    fn execute(
        &self,
        job: &PersistedJob,
        listeners: ExecutionListeners,
    ) -> CancellablePromise<JobExecutionResult> {
        (self.execute)(job, listeners)
    }
}

/// Optional caller-side sinks for a job's live stdout/stderr.
///
/// Each sink receives every chunk the executor emits after submission and is
/// closed when the job reaches a terminal state.
#[derive(Debug, Clone, Default)]
pub struct JobEventListeners {
    pub stdout: Option<UnboundedSender<Bytes>>,
    pub stderr: Option<UnboundedSender<Bytes>>,
}

impl JobEventListeners {
    /// Listeners that discard everything.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_stdout(mut self, sink: UnboundedSender<Bytes>) -> Self {
        self.stdout = Some(sink);
        self
    }

    pub fn with_stderr(mut self, sink: UnboundedSender<Bytes>) -> Self {
        self.stderr = Some(sink);
        self
    }
}
