#![allow(clippy::disallowed_methods)]

mod common;

use common::TestResult;

use bytes::Bytes;
use job_core::{BinaryData, JobId, JobOutput, JobOutputId, JobStatus, OutputChannel};

use db::{DbError, JobDao, repositories::JobRepository, repositories::StatusRepository};

#[test]
fn test_persist_assigns_id_and_round_trips_request() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        let dao = common::memory_dao().await?;
        let request = common::sample_request();

        let first = dao.persist(&request).await?;
        let second = dao.persist(&request).await?;
        assert_ne!(first.id, second.id);

        let loaded = dao.job(first.id).await?;
        assert_eq!(loaded.request, request);
        assert_eq!(loaded.request.inputs["pages"], serde_json::json!(12));
        assert!(dao.job_exists(first.id).await?);

        let by_owner = JobRepository::list_by_owner("alice", 10).await?;
        assert_eq!(by_owner.len(), 2);

        let missing = dao.job(JobId::new()).await;
        assert!(matches!(missing, Err(DbError::NotFound(_))));
        Ok(())
    })
}

#[test]
fn test_status_history_reads_back_in_order() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        let dao = common::memory_dao().await?;
        let job = dao.persist(&common::sample_request()).await?;

        dao.add_new_job_status(job.id, JobStatus::Submitted, "Queued by job manager")
            .await?;
        dao.add_new_job_status(job.id, JobStatus::Running, "Submitted to executor")
            .await?;
        dao.add_new_job_status(job.id, JobStatus::Finished, "Execution finished")
            .await?;

        let history = dao.status_history(job.id).await?;
        let statuses: Vec<JobStatus> = history.iter().map(|c| c.status).collect();
        assert_eq!(
            statuses,
            vec![JobStatus::Submitted, JobStatus::Running, JobStatus::Finished]
        );
        assert_eq!(history[1].message, "Submitted to executor");

        let latest = dao.latest_status(job.id).await?.expect("latest status");
        assert_eq!(latest.status, JobStatus::Finished);

        assert!(StatusRepository::history(JobId::new()).await?.is_empty());
        Ok(())
    })
}

#[test]
fn test_jobs_with_status_uses_latest_transition() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        let dao = common::memory_dao().await?;
        let done = dao.persist(&common::sample_request()).await?;
        let running = dao.persist(&common::sample_request()).await?;

        for job in [&done, &running] {
            dao.add_new_job_status(job.id, JobStatus::Submitted, "queued").await?;
            dao.add_new_job_status(job.id, JobStatus::Running, "running").await?;
        }
        dao.add_new_job_status(done.id, JobStatus::Aborted, "aborted").await?;

        assert_eq!(dao.jobs_with_status(JobStatus::Running).await?, vec![running.id]);
        assert_eq!(dao.jobs_with_status(JobStatus::Aborted).await?, vec![done.id]);
        assert!(dao.jobs_with_status(JobStatus::Submitted).await?.is_empty());
        Ok(())
    })
}

#[test]
fn test_outputs_store_metadata_and_bytes() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        let dao = common::memory_dao().await?;
        let job = dao.persist(&common::sample_request()).await?;

        let mut output = JobOutput::new("out", BinaryData::new("hello", "text/plain"));
        output.name = Some("Output".to_string());
        output.metadata.insert("lang".to_string(), "en".to_string());
        dao.persist_output(job.id, &output).await?;

        let listed = dao.outputs(job.id).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].output_id.as_str(), "out");
        assert_eq!(listed[0].size_bytes, 5);
        assert_eq!(listed[0].name.as_deref(), Some("Output"));
        assert_eq!(listed[0].metadata["lang"], "en");

        let data = dao
            .output(job.id, &JobOutputId::from("out"))
            .await?
            .expect("stored output");
        assert_eq!(data.data, Bytes::from("hello"));
        assert_eq!(data.mime_type, "text/plain");

        // Persisting again replaces rather than duplicates.
        let replacement = JobOutput::new("out", BinaryData::wrap("bye"));
        dao.persist_output(job.id, &replacement).await?;
        let listed = dao.outputs(job.id).await?;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size_bytes, 3);

        assert!(dao.output(job.id, &JobOutputId::from("nope")).await?.is_none());
        Ok(())
    })
}

#[test]
fn test_console_output_is_kept_per_channel() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        let dao = common::memory_dao().await?;
        let job = dao.persist(&common::sample_request()).await?;

        dao.persist_console_output(job.id, OutputChannel::Stdout, Bytes::from("out\n"))
            .await?;

        assert_eq!(
            dao.console_output(job.id, OutputChannel::Stdout).await?,
            Some(Bytes::from("out\n"))
        );
        assert_eq!(dao.console_output(job.id, OutputChannel::Stderr).await?, None);
        Ok(())
    })
}

#[test]
fn test_get_db_after_init() -> TestResult {
    common::block_on(async {
        let _guard = common::setup_db().await?;
        assert!(db::get_db().is_ok());

        let other = db::init_db(db::DbConfig::rocksdb("/tmp/never-used")).await;
        assert!(matches!(other, Err(DbError::AlreadyInitialized)));
        Ok(())
    })
}
