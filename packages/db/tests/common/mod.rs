use std::error::Error;
use std::sync::LazyLock;

use job_core::{ExecutionConfig, ExpectedOutput, JobRequest, JobSpec};
use storage::{ArtifactStore, StorageConfig};
use tokio::runtime::Runtime;
use tokio::sync::{Mutex, MutexGuard};

use db::{DbConfig, DbError, SurrealJobDao};

pub type TestResult = Result<(), Box<dyn Error>>;

static TEST_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

// The in-memory engine runs on the runtime that opened the connection, so
// every test drives the shared database from this one.
static RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("test runtime")
});

pub fn block_on(test: impl Future<Output = TestResult>) -> TestResult {
    RUNTIME.block_on(test)
}

pub async fn setup_db() -> Result<MutexGuard<'static, ()>, DbError> {
    let guard = TEST_LOCK.lock().await;
    db::init(DbConfig::memory()).await?;
    let db_conn = db::get_db()?;
    db_conn
        .query("DELETE job_output; DELETE job_status; DELETE job;")
        .await?;
    Ok(guard)
}

pub async fn memory_dao() -> Result<SurrealJobDao, DbError> {
    let artifacts = ArtifactStore::new(StorageConfig::memory()).await?;
    Ok(SurrealJobDao::new(artifacts))
}

pub fn sample_request() -> JobRequest {
    let spec = JobSpec::new(
        "report",
        "Report",
        ExecutionConfig::new("sh").with_args(["-c", "echo done > out.txt"]),
    )
    .with_expected_output(ExpectedOutput::new("out", "out.txt").required());

    JobRequest::new("alice", "nightly report", spec)
        .with_input("pages", serde_json::json!(12))
}
