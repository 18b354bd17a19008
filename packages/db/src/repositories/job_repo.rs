//! Job repository: persisted requests keyed by job id.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use job_core::{JobId, JobRequest, JobSpec, PersistedJob};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::{DbError, get_db};

/// Repository for persisted job requests.
pub struct JobRepository;

/// Internal record type for SurrealDB.
#[derive(Debug, Serialize, Deserialize)]
struct JobRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    job_id: String,
    owner: String,
    name: String,
    spec: JobSpec,
    #[serde(default)]
    inputs: HashMap<String, serde_json::Value>,
    submitted_at: DateTime<Utc>,
}

impl JobRecord {
    fn from_job(job: &PersistedJob) -> Self {
        Self {
            id: None,
            job_id: job.id.to_string(),
            owner: job.request.owner.clone(),
            name: job.request.name.clone(),
            spec: job.request.spec.clone(),
            inputs: job.request.inputs.clone(),
            submitted_at: job.submitted_at,
        }
    }

    fn into_job(self) -> Result<PersistedJob, DbError> {
        let id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {e}", self.job_id)))?;
        Ok(PersistedJob {
            id,
            request: JobRequest {
                owner: self.owner,
                name: self.name,
                spec: self.spec,
                inputs: self.inputs,
            },
            submitted_at: self.submitted_at,
        })
    }
}

impl JobRepository {
    /// Store a newly persisted job.
    pub async fn create(job: &PersistedJob) -> Result<PersistedJob, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db
            .create(("job", job.id.to_string()))
            .content(JobRecord::from_job(job))
            .await?;

        record
            .ok_or_else(|| DbError::Query(format!("Failed to create job {}", job.id)))?
            .into_job()
    }

    /// Get a job by ID.
    pub async fn get(id: JobId) -> Result<PersistedJob, DbError> {
        let db = get_db()?;

        let record: Option<JobRecord> = db.select(("job", id.to_string())).await?;

        record
            .ok_or_else(|| DbError::NotFound(format!("Job not found: {}", id)))?
            .into_job()
    }

    pub async fn exists(id: JobId) -> Result<bool, DbError> {
        let db = get_db()?;
        let record: Option<JobRecord> = db.select(("job", id.to_string())).await?;
        Ok(record.is_some())
    }

    /// Jobs submitted by `owner`, oldest first.
    pub async fn list_by_owner(owner: &str, limit: usize) -> Result<Vec<PersistedJob>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query(
                r#"
                SELECT * FROM job
                WHERE owner = $owner
                ORDER BY job_id ASC
                LIMIT $limit
                "#,
            )
            .bind(("owner", owner.to_string()))
            .bind(("limit", limit as i64))
            .await?;

        let records: Vec<JobRecord> = result.take(0)?;

        records.into_iter().map(JobRecord::into_job).collect()
    }
}
