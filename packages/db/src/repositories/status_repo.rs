//! Status history repository.
//!
//! Every transition is a separate row. Rows carry a sequence number that is
//! strictly increasing within the process so the history of a job reads back
//! in the order it was written, even when two transitions share a timestamp.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use job_core::{JobId, JobStatus};
use serde::{Deserialize, Serialize};
use surrealdb::sql::Thing;

use crate::{DbError, get_db};

static LAST_SEQUENCE: AtomicI64 = AtomicI64::new(0);

fn next_sequence(now: DateTime<Utc>) -> i64 {
    let candidate = now.timestamp_nanos_opt().unwrap_or(i64::MAX);
    let mut current = LAST_SEQUENCE.load(Ordering::Relaxed);
    loop {
        let next = candidate.max(current.saturating_add(1));
        match LAST_SEQUENCE.compare_exchange_weak(
            current,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return next,
            Err(actual) => current = actual,
        }
    }
}

/// One recorded status transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobStatusChange {
    pub job_id: JobId,
    pub status: JobStatus,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Thing>,
    job_id: String,
    status: JobStatus,
    message: String,
    sequence: i64,
    timestamp: DateTime<Utc>,
}

impl StatusRecord {
    fn into_change(self) -> Result<JobStatusChange, DbError> {
        let job_id = JobId::parse(&self.job_id)
            .map_err(|e| DbError::Serialization(format!("bad job id {}: {e}", self.job_id)))?;
        Ok(JobStatusChange {
            job_id,
            status: self.status,
            message: self.message,
            timestamp: self.timestamp,
        })
    }
}

pub struct StatusRepository;

impl StatusRepository {
    /// Append a transition to a job's history.
    pub async fn append(job_id: JobId, status: JobStatus, message: &str) -> Result<(), DbError> {
        let db = get_db()?;
        let timestamp = Utc::now();

        let record = StatusRecord {
            id: None,
            job_id: job_id.to_string(),
            status,
            message: message.to_string(),
            sequence: next_sequence(timestamp),
            timestamp,
        };

        let _: Option<StatusRecord> = db.create("job_status").content(record).await?;
        Ok(())
    }

    /// Full history of a job, oldest first.
    pub async fn history(job_id: JobId) -> Result<Vec<JobStatusChange>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT * FROM job_status WHERE job_id = $job_id ORDER BY sequence ASC")
            .bind(("job_id", job_id.to_string()))
            .await?;

        let records: Vec<StatusRecord> = result.take(0)?;
        records.into_iter().map(StatusRecord::into_change).collect()
    }

    pub async fn latest(job_id: JobId) -> Result<Option<JobStatusChange>, DbError> {
        Ok(Self::history(job_id).await?.pop())
    }

    /// Ids of every job whose most recent status is `status`.
    pub async fn jobs_with_latest_status(status: JobStatus) -> Result<Vec<JobId>, DbError> {
        let db = get_db()?;

        let mut result = db
            .query("SELECT * FROM job_status ORDER BY sequence ASC")
            .await?;
        let records: Vec<StatusRecord> = result.take(0)?;

        let mut latest: HashMap<String, JobStatus> = HashMap::new();
        for record in records {
            latest.insert(record.job_id, record.status);
        }

        let mut ids = latest
            .into_iter()
            .filter(|(_, s)| *s == status)
            .map(|(id, _)| {
                JobId::parse(&id)
                    .map_err(|e| DbError::Serialization(format!("bad job id {id}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_is_strictly_increasing_for_equal_timestamps() {
        let now = Utc::now();
        let a = next_sequence(now);
        let b = next_sequence(now);
        let c = next_sequence(now);
        assert!(a < b && b < c);
    }
}
