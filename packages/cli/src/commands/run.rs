//! `jobctl run`

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use actors::{JobEventListeners, JobManager, JobManagerConfig};
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Args;
use db::{DbConfig, SurrealJobDao};
use job_core::{FinalizedJob, JobOutputResult, JobRequest};
use process_executor::{LocalExecutorConfig, LocalJobExecutor};
use storage::{ArtifactStore, StorageConfig};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// JSON file holding the job request
    pub request: PathBuf,

    /// Directory job working directories are created in (default: a
    /// temporary directory removed on exit)
    #[arg(long, env = "JOBS_WORKING_DIRS")]
    pub working_dirs: Option<PathBuf>,

    /// How many jobs may run at once
    #[arg(long, env = "JOBS_MAX_RUNNING_JOBS", default_value_t = 10)]
    pub max_running_jobs: usize,

    /// Keep outputs and console logs under this directory instead of in memory
    #[arg(long, env = "ARTIFACT_ROOT")]
    pub artifact_root: Option<PathBuf>,

    /// Milliseconds an aborted job may take to exit after being killed
    #[arg(long, env = "JOBS_KILL_DELAY_MS", default_value_t = 1000)]
    pub kill_delay_ms: u64,

    /// Delete each job's working directory once it is done
    #[arg(long, env = "JOBS_REMOVE_WORKING_DIRS")]
    pub remove_working_dirs: bool,
}

pub async fn handle_run(args: RunArgs) -> Result<i32> {
    let request = load_request(&args.request)?;

    db::init(DbConfig::memory())
        .await
        .context("Failed to start the database")?;

    let storage_config = match &args.artifact_root {
        Some(root) => StorageConfig::filesystem(root),
        None => StorageConfig::memory(),
    };
    let artifacts = ArtifactStore::new(storage_config)
        .await
        .context("Failed to open the artifact store")?;
    let dao = Arc::new(SurrealJobDao::new(artifacts));

    let (working_dirs, _scratch) = match args.working_dirs {
        Some(dir) => (dir, None),
        None => {
            let scratch = tempfile::tempdir().context("Failed to create a scratch directory")?;
            (scratch.path().to_path_buf(), Some(scratch))
        }
    };
    let executor = LocalJobExecutor::new(
        LocalExecutorConfig::new(working_dirs)
            .with_kill_delay(Duration::from_millis(args.kill_delay_ms))
            .remove_after_execution(args.remove_working_dirs),
    )?;

    let (manager, _handle) = JobManager::start(
        dao,
        Arc::new(executor),
        JobManagerConfig::new(args.max_running_jobs),
    )
    .await?;

    let (stdout_tx, stdout_rx) = mpsc::unbounded_channel();
    let (stderr_tx, stderr_rx) = mpsc::unbounded_channel();
    let echo_stdout = tokio::spawn(echo(stdout_rx, tokio::io::stdout()));
    let echo_stderr = tokio::spawn(echo(stderr_rx, tokio::io::stderr()));
    let listeners = JobEventListeners::none()
        .with_stdout(stdout_tx)
        .with_stderr(stderr_tx);

    let mut events = manager.all_job_status_changes();
    let (job_id, promise) = manager.submit_with_listeners(request, listeners).await?;
    info!("Submitted job {}", job_id);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if event.job_id == job_id {
                info!("{}", event.description());
            }
        }
    });

    let mut abort_requested = false;
    let finalized = loop {
        tokio::select! {
            outcome = promise.get() => break outcome?,
            _ = tokio::signal::ctrl_c(), if !abort_requested => {
                warn!("Interrupted, aborting job {}", job_id);
                abort_requested = true;
                if !manager.try_abort(job_id).await {
                    warn!("Job {} could not be aborted", job_id);
                }
            }
        }
    };

    // Both sinks are closed once the job is terminal.
    let _ = echo_stdout.await;
    let _ = echo_stderr.await;

    eprint!("{}", summary(&finalized));
    manager.shutdown();

    Ok(finalized.final_status.to_exit_code())
}

fn load_request(path: &Path) -> Result<JobRequest> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read job request {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("Cannot parse job request {}", path.display()))
}

async fn echo<W>(mut chunks: mpsc::UnboundedReceiver<Bytes>, mut out: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = chunks.recv().await {
        if out.write_all(&chunk).await.is_err() {
            return;
        }
        let _ = out.flush().await;
    }
}

fn summary(job: &FinalizedJob) -> String {
    let mut text = format!("Job {} {}: {}\n", job.job_id, job.final_status, job.message);
    for output in &job.outputs {
        let line = match output {
            JobOutputResult::Output(o) => {
                format!("  {}: {} bytes ({})\n", o.id, o.data.len(), o.data.mime_type)
            }
            JobOutputResult::Missing(m) if m.required => {
                format!("  {}: missing required output {}\n", m.id, m.path)
            }
            JobOutputResult::Missing(m) => format!("  {}: not produced ({})\n", m.id, m.path),
        };
        text.push_str(&line);
    }
    text
}
