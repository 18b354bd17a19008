//! [`JobDao`] backed by SurrealDB for records and the artifact store for bytes.

use bytes::Bytes;
use job_core::{
    BinaryData, JobId, JobOutput, JobOutputId, JobRequest, JobStatus, OutputChannel, PersistedJob,
};
use storage::{ArtifactKey, ArtifactStore};

use crate::dao::{DaoFuture, JobDao};
use crate::repositories::{
    JobRepository, JobStatusChange, OutputMetadata, OutputRepository, StatusRepository,
};
use crate::DbError;

/// Requires the global database to be initialized (see [`crate::init`]).
#[derive(Debug, Clone)]
pub struct SurrealJobDao {
    artifacts: ArtifactStore,
}

impl SurrealJobDao {
    pub fn new(artifacts: ArtifactStore) -> Self {
        Self { artifacts }
    }

    pub async fn job(&self, job_id: JobId) -> Result<PersistedJob, DbError> {
        JobRepository::get(job_id).await
    }

    pub async fn job_exists(&self, job_id: JobId) -> Result<bool, DbError> {
        JobRepository::exists(job_id).await
    }

    pub async fn status_history(&self, job_id: JobId) -> Result<Vec<JobStatusChange>, DbError> {
        StatusRepository::history(job_id).await
    }

    pub async fn latest_status(&self, job_id: JobId) -> Result<Option<JobStatusChange>, DbError> {
        StatusRepository::latest(job_id).await
    }

    pub async fn jobs_with_status(&self, status: JobStatus) -> Result<Vec<JobId>, DbError> {
        StatusRepository::jobs_with_latest_status(status).await
    }

    pub async fn outputs(&self, job_id: JobId) -> Result<Vec<OutputMetadata>, DbError> {
        OutputRepository::list(job_id).await
    }

    /// Bytes and MIME type of a persisted output.
    pub async fn output(
        &self,
        job_id: JobId,
        output_id: &JobOutputId,
    ) -> Result<Option<BinaryData>, DbError> {
        let Some(meta) = OutputRepository::get(job_id, output_id).await? else {
            return Ok(None);
        };
        let data = self
            .artifacts
            .get(&ArtifactKey::output(job_id, output_id))
            .await?
            .ok_or_else(|| {
                DbError::NotFound(format!("Bytes for output {output_id} of job {job_id}"))
            })?;
        Ok(Some(BinaryData::new(data, meta.mime_type)))
    }

    pub async fn console_output(
        &self,
        job_id: JobId,
        channel: OutputChannel,
    ) -> Result<Option<Bytes>, DbError> {
        Ok(self
            .artifacts
            .get(&ArtifactKey::console(job_id, channel))
            .await?)
    }
}

impl JobDao for SurrealJobDao {
    fn persist<'a>(&'a self, request: &'a JobRequest) -> DaoFuture<'a, PersistedJob> {
        Box::pin(async move {
            let job = PersistedJob::new(JobId::new(), request.clone());
            let stored = JobRepository::create(&job).await?;
            tracing::debug!("Persisted job {} for {}", stored.id, stored.request.owner);
            Ok(stored)
        })
    }

    fn add_new_job_status<'a>(
        &'a self,
        job_id: JobId,
        status: JobStatus,
        message: &'a str,
    ) -> DaoFuture<'a, ()> {
        Box::pin(StatusRepository::append(job_id, status, message))
    }

    fn persist_output<'a>(&'a self, job_id: JobId, output: &'a JobOutput) -> DaoFuture<'a, ()> {
        Box::pin(async move {
            self.artifacts
                .put(&ArtifactKey::output(job_id, &output.id), output.data.data.clone())
                .await?;
            OutputRepository::upsert(&OutputMetadata::from_output(job_id, output)).await
        })
    }

    fn persist_console_output(
        &self,
        job_id: JobId,
        channel: OutputChannel,
        data: Bytes,
    ) -> DaoFuture<'_, ()> {
        Box::pin(async move {
            self.artifacts
                .put(&ArtifactKey::console(job_id, channel), data)
                .await?;
            Ok(())
        })
    }
}
