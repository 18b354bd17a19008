#![cfg(unix)]
#![allow(clippy::disallowed_methods)]

mod common;

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use actors::{JobManager, JobManagerConfig, MSG_FINISHED};
use common::TIMEOUT;
use db::{DbConfig, SurrealJobDao};
use job_core::{ExecutionConfig, ExpectedOutput, JobRequest, JobSpec, JobStatus, OutputChannel};
use process_executor::{LocalExecutorConfig, LocalJobExecutor};
use storage::{ArtifactStore, StorageConfig};
use tokio::runtime::Runtime;

// The in-memory database is process-wide and bound to the runtime that
// opened it.
static RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("test runtime")
});

fn block_on<F: Future>(test: F) -> F::Output {
    RUNTIME.block_on(test)
}

async fn start(root: &std::path::Path) -> (JobManager, Arc<SurrealJobDao>) {
    db::init(DbConfig::memory()).await.expect("database");
    let artifacts = ArtifactStore::new(StorageConfig::memory())
        .await
        .expect("artifact store");
    let dao = Arc::new(SurrealJobDao::new(artifacts));
    let executor =
        LocalJobExecutor::new(LocalExecutorConfig::new(root.join("wds"))).expect("executor");

    let (manager, _handle) =
        JobManager::start(dao.clone(), Arc::new(executor), JobManagerConfig::new(2))
            .await
            .expect("manager");
    (manager, dao)
}

#[test]
fn test_job_runs_to_completion_and_is_persisted() {
    block_on(async {
        let root = tempfile::tempdir().unwrap();
        let (manager, dao) = start(root.path()).await;

        let spec = JobSpec::new(
            "report",
            "Report",
            ExecutionConfig::new("sh").with_args(["-c", "echo working; printf '{}' > result.json"]),
        )
        .with_expected_output(ExpectedOutput::new("result", "result.json").required());
        let (job_id, promise) = manager
            .submit(JobRequest::new("alice", "report", spec))
            .await
            .unwrap();

        let finalized = promise.get_timeout(TIMEOUT).await.unwrap();
        assert_eq!(finalized.final_status, JobStatus::Finished);
        assert_eq!(finalized.message, MSG_FINISHED);

        let history: Vec<JobStatus> = dao
            .status_history(job_id)
            .await
            .unwrap()
            .into_iter()
            .map(|change| change.status)
            .collect();
        assert_eq!(
            history,
            vec![JobStatus::Submitted, JobStatus::Running, JobStatus::Finished]
        );

        let output = dao
            .output(job_id, &"result".into())
            .await
            .unwrap()
            .expect("output stored");
        assert_eq!(output.data.as_ref(), b"{}");
        assert_eq!(output.mime_type, "application/json");

        // Console output is stored once the stream completes.
        let stdout = tokio::time::timeout(TIMEOUT, async {
            loop {
                if let Ok(Some(data)) = dao.console_output(job_id, OutputChannel::Stdout).await {
                    return data;
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(stdout.as_ref(), b"working\n");
    })
}

#[test]
fn test_running_job_can_be_aborted() {
    block_on(async {
        let root = tempfile::tempdir().unwrap();
        let (manager, dao) = start(root.path()).await;

        let spec = JobSpec::new("sleep", "Sleep", ExecutionConfig::new("sleep").with_args(["30"]));
        let (job_id, promise) = manager
            .submit(JobRequest::new("bob", "sleeper", spec))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(manager.try_abort(job_id).await);

        let finalized = promise.get_timeout(TIMEOUT).await.unwrap();
        assert_eq!(finalized.final_status, JobStatus::Aborted);

        let latest = dao.latest_status(job_id).await.unwrap().expect("status");
        assert_eq!(latest.status, JobStatus::Aborted);
    })
}
