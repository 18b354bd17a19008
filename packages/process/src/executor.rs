//! Local subprocess executor.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;

use actors::{CancellablePromise, ExecutionListeners, JobExecutor, Topic};
use bytes::Bytes;
use job_core::{JobExecutionResult, JobId, JobStatus, PersistedJob};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::LocalExecutorConfig;
use crate::error::ExecutorError;
use crate::{outputs, workspace};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Executes each job as a subprocess in its own working directory.
///
/// `execute` must be called from within a Tokio runtime.
#[derive(Debug, Clone)]
pub struct LocalJobExecutor {
    config: Arc<LocalExecutorConfig>,
}

impl LocalJobExecutor {
    /// Validate `config` and make sure the working directory root exists.
    pub fn new(config: LocalExecutorConfig) -> Result<Self, ExecutorError> {
        config.validate()?;
        std::fs::create_dir_all(&config.working_dirs).map_err(|e| {
            ExecutorError::io(
                format!("cannot create {}", config.working_dirs.display()),
                e,
            )
        })?;
        info!(
            "Local executor using working directories under {}",
            config.working_dirs.display()
        );
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &LocalExecutorConfig {
        &self.config
    }

    /// Where `job_id` runs.
    pub fn working_dir(&self, job_id: JobId) -> PathBuf {
        self.config.working_dirs.join(job_id.to_string())
    }
}

impl JobExecutor for LocalJobExecutor {
    fn execute(
        &self,
        job: &PersistedJob,
        listeners: ExecutionListeners,
    ) -> CancellablePromise<JobExecutionResult> {
        let promise = CancellablePromise::new();

        let (cancel_tx, cancel_rx) = oneshot::channel();
        promise.on_cancel(move || {
            let _ = cancel_tx.send(());
        });

        let run = JobRun {
            working_dir: self.working_dir(job.id),
            job: job.clone(),
            config: Arc::clone(&self.config),
            listeners,
        };
        let done = promise.clone();
        tokio::spawn(async move {
            let result = run.run(cancel_rx).await;
            done.complete(result);
        });

        promise
    }
}

struct JobRun {
    job: PersistedJob,
    working_dir: PathBuf,
    config: Arc<LocalExecutorConfig>,
    listeners: ExecutionListeners,
}

enum Ended {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
}

impl JobRun {
    async fn run(self, cancel: oneshot::Receiver<()>) -> JobExecutionResult {
        let job_id = self.job.id;

        let result = match self.launch().await {
            Ok(child) => self.supervise(child, cancel).await,
            Err(e) => {
                error!("Job {}: cannot start: {}", job_id, e);
                JobExecutionResult::fatal()
            }
        };

        if self.config.remove_after_execution {
            workspace::remove(job_id, &self.working_dir).await;
        }
        result
    }

    async fn launch(&self) -> Result<Child, ExecutorError> {
        let execution = &self.job.spec().execution;
        workspace::prepare(self.job.id, &self.working_dir, &execution.dependencies).await?;

        let child = Command::new(&execution.application)
            .args(&execution.arguments)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutorError::io(format!("cannot spawn '{}'", execution.application), e)
            })?;

        info!(
            "Job {}: launched {} {}",
            self.job.id,
            execution.application,
            execution.arguments.join(" ")
        );
        Ok(child)
    }

    async fn supervise(
        &self,
        mut child: Child,
        mut cancel: oneshot::Receiver<()>,
    ) -> JobExecutionResult {
        let job_id = self.job.id;
        let readers = [
            child
                .stdout
                .take()
                .map(|out| spawn_reader(out, self.listeners.stdout.clone())),
            child
                .stderr
                .take()
                .map(|err| spawn_reader(err, self.listeners.stderr.clone())),
        ];

        let ended = tokio::select! {
            status = child.wait() => Ended::Exited(status),
            Ok(()) = &mut cancel => Ended::Cancelled,
        };

        match ended {
            Ended::Cancelled => {
                self.kill(&mut child).await;
                // Orphaned grandchildren may hold the pipes open.
                let delay = self.config.delay_before_forcibly_killing;
                for reader in readers.into_iter().flatten() {
                    let abort = reader.abort_handle();
                    if tokio::time::timeout(delay, reader).await.is_err() {
                        abort.abort();
                    }
                }
                JobExecutionResult::new(JobStatus::Aborted)
            }
            Ended::Exited(Err(e)) => {
                error!("Job {}: lost track of the process: {}", job_id, e);
                join_readers(readers).await;
                JobExecutionResult::fatal()
            }
            Ended::Exited(Ok(status)) => {
                join_readers(readers).await;
                let final_status = exit_status_to_job_status(status);
                debug!("Job {}: exited with {} ({})", job_id, status, final_status);

                if final_status == JobStatus::Finished {
                    let outputs = outputs::collect(
                        job_id,
                        &self.working_dir,
                        &self.job.spec().expected_outputs,
                    )
                    .await;
                    JobExecutionResult::with_outputs(final_status, outputs)
                } else {
                    JobExecutionResult::new(final_status)
                }
            }
        }
    }

    /// Ask the process to terminate, then kill it if it is still running
    /// after `delay_before_forcibly_killing`.
    async fn kill(&self, child: &mut Child) {
        let job_id = self.job.id;
        let delay = self.config.delay_before_forcibly_killing;
        debug!("Job {}: aborting process", job_id);

        if terminate(job_id, child) {
            match tokio::time::timeout(delay, child.wait()).await {
                Ok(_) => return,
                Err(_) => warn!(
                    "Job {}: process ignored SIGTERM for {:?}; killing it",
                    job_id, delay
                ),
            }
        }

        if let Err(e) = child.start_kill() {
            warn!("Job {}: cannot kill process: {}", job_id, e);
            return;
        }
        if tokio::time::timeout(delay, child.wait()).await.is_err() {
            warn!("Job {}: process did not exit within {:?} of SIGKILL", job_id, delay);
        }
    }
}

/// Send SIGTERM. Returns false when the signal could not be delivered.
#[cfg(unix)]
fn terminate(job_id: JobId, child: &Child) -> bool {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;

    // No pid once the child has been reaped.
    let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) else {
        return false;
    };
    match kill(Pid::from_raw(pid), Signal::SIGTERM) {
        Ok(()) => true,
        Err(e) => {
            warn!("Job {}: cannot send SIGTERM: {}", job_id, e);
            false
        }
    }
}

#[cfg(not(unix))]
fn terminate(_job_id: JobId, _child: &Child) -> bool {
    false
}

fn spawn_reader<R>(mut reader: R, topic: Topic<Bytes>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; READ_CHUNK_SIZE];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    topic.publish(Bytes::copy_from_slice(&buf[..n]));
                }
                Err(e) => {
                    debug!("Console stream closed with error: {}", e);
                    break;
                }
            }
        }
    })
}

async fn join_readers(readers: [Option<JoinHandle<()>>; 2]) {
    for reader in readers.into_iter().flatten() {
        let _ = reader.await;
    }
}

/// Map a process exit status, treating death by signal like a shell would
/// (`128 + signal`).
fn exit_status_to_job_status(status: ExitStatus) -> JobStatus {
    match status.code().or_else(|| signal_exit_code(status)) {
        Some(code) => JobStatus::from_exit_code(code),
        None => JobStatus::FatalError,
    }
}

#[cfg(unix)]
fn signal_exit_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal().map(|signal| 128 + signal)
}

#[cfg(not(unix))]
fn signal_exit_code(_status: ExitStatus) -> Option<i32> {
    None
}
