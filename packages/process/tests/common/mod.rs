#![allow(dead_code)]

use std::time::Duration;

use actors::{CancellablePromise, ExecutionListeners, JobExecutor, Subscription};
use bytes::{Bytes, BytesMut};
use job_core::{ExecutionConfig, JobExecutionResult, JobId, JobRequest, JobSpec, PersistedJob};
use process_executor::{LocalExecutorConfig, LocalJobExecutor};
use tempfile::TempDir;

pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn executor(
    config: impl FnOnce(LocalExecutorConfig) -> LocalExecutorConfig,
) -> (LocalJobExecutor, TempDir) {
    let root = tempfile::tempdir().expect("temp dir");
    let config = config(LocalExecutorConfig::new(root.path().join("wds")));
    let executor = LocalJobExecutor::new(config).expect("executor");
    (executor, root)
}

pub fn shell_job(script: &str) -> PersistedJob {
    job(ExecutionConfig::new("sh").with_args(["-c", script]))
}

pub fn job(execution: ExecutionConfig) -> PersistedJob {
    let spec = JobSpec::new("test", "Test", execution);
    PersistedJob::new(JobId::new(), JobRequest::new("tester", "test job", spec))
}

/// Listeners plus subscriptions to both of their topics.
pub fn listeners() -> (ExecutionListeners, Subscription<Bytes>, Subscription<Bytes>) {
    let listeners = ExecutionListeners::new();
    let stdout = listeners.stdout.subscribe();
    let stderr = listeners.stderr.subscribe();
    (listeners, stdout, stderr)
}

pub async fn run(executor: &LocalJobExecutor, job: &PersistedJob) -> JobExecutionResult {
    let (listeners, _, _) = listeners();
    wait(executor.execute(job, listeners)).await
}

pub async fn wait(promise: CancellablePromise<JobExecutionResult>) -> JobExecutionResult {
    promise.get_timeout(TIMEOUT).await.expect("job result in time")
}

/// Everything already buffered on a subscription.
pub fn drain(subscription: &mut Subscription<Bytes>) -> Bytes {
    let mut all = BytesMut::new();
    while let Some(chunk) = subscription.try_recv() {
        all.extend_from_slice(&chunk);
    }
    all.freeze()
}
