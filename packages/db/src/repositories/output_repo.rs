//! Output metadata repository.

use std::collections::HashMap;

use job_core::{JobId, JobOutput, JobOutputId};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::{DbError, get_db};

/// Stored description of a persisted output. The bytes are in the artifact store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputMetadata {
    pub job_id: JobId,
    pub output_id: JobOutputId,
    pub mime_type: String,
    pub size_bytes: u64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl OutputMetadata {
    pub fn from_output(job_id: JobId, output: &JobOutput) -> Self {
        Self {
            job_id,
            output_id: output.id.clone(),
            mime_type: output.data.mime_type.clone(),
            size_bytes: output.data.len() as u64,
            name: output.name.clone(),
            description: output.description.clone(),
            metadata: output.metadata.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OutputRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    job_id: String,
    output_id: String,
    mime_type: String,
    size_bytes: i64,
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl OutputRecord {
    fn into_metadata(self) -> Result<OutputMetadata, DbError> {
        let job_id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {e}", self.job_id)))?;
        Ok(OutputMetadata {
            job_id,
            output_id: JobOutputId::new(self.output_id),
            mime_type: self.mime_type,
            size_bytes: self.size_bytes.max(0) as u64,
            name: self.name,
            description: self.description,
            metadata: self.metadata,
        })
    }
}

fn record_key(job_id: JobId, output_id: &JobOutputId) -> (&'static str, String) {
    ("job_output", format!("{job_id}:{output_id}"))
}

pub struct OutputRepository;

impl OutputRepository {
    /// Insert or replace the metadata of one output.
    pub async fn upsert(meta: &OutputMetadata) -> Result<(), DbError> {
        let db = get_db()?;

        let record = OutputRecord {
            id: None,
            job_id: meta.job_id.to_string(),
            output_id: meta.output_id.to_string(),
            mime_type: meta.mime_type.clone(),
            size_bytes: meta.size_bytes as i64,
            name: meta.name.clone(),
            description: meta.description.clone(),
            metadata: meta.metadata.clone(),
        };

        let _: Option<OutputRecord> = db
            .upsert(record_key(meta.job_id, &meta.output_id))
            .content(record)
            .await?;
        Ok(())
    }

    pub async fn get(
        job_id: JobId,
        output_id: &JobOutputId,
    ) -> Result<Option<OutputMetadata>, DbError> {
        let db = get_db()?;
        let record: Option<OutputRecord> = db.select(record_key(job_id, output_id)).await?;
        record.map(OutputRecord::into_metadata).transpose()
    }

    /// Metadata of every output persisted for a job, ordered by output id.
    pub async fn list(job_id: JobId) -> Result<Vec<OutputMetadata>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT * FROM job_output WHERE job_id = $job_id ORDER BY output_id ASC")
            .bind(("job_id", job_id.to_string()))
            .await?;

        let records: Vec<OutputRecord> = result.take(0)?;
        records.into_iter().map(OutputRecord::into_metadata).collect()
    }
}
