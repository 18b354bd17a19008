//! The persistence contract the job manager writes through.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use job_core::{JobId, JobOutput, JobRequest, JobStatus, OutputChannel, PersistedJob};

use crate::DbError;

/// Future type returned by [`JobDao`] methods.
pub type DaoFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, DbError>> + Send + 'a>>;

/// Durable record of job requests, status transitions and produced bytes.
///
/// The manager awaits each call before moving on, but never holds up
/// unrelated jobs on a slow write.
pub trait JobDao: Send + Sync + 'static {
    /// Store a request and assign its canonical id.
    fn persist<'a>(&'a self, request: &'a JobRequest) -> DaoFuture<'a, PersistedJob>;

    fn add_new_job_status<'a>(
        &'a self,
        job_id: JobId,
        status: JobStatus,
        message: &'a str,
    ) -> DaoFuture<'a, ()>;

    fn persist_output<'a>(&'a self, job_id: JobId, output: &'a JobOutput) -> DaoFuture<'a, ()>;

    /// Store everything a job wrote to one console stream.
    fn persist_console_output(
        &self,
        job_id: JobId,
        channel: OutputChannel,
        data: Bytes,
    ) -> DaoFuture<'_, ()>;
}
