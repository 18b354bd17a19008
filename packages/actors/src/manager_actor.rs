//! Job manager actor.
//!
//! The actor owns the job table: every admission, removal, counter change and
//! queue push/pop happens inside `handle`, one message at a time. Executor
//! promises are awaited on separate tasks that report back with
//! [`ManagerMessage::ExecutionFinished`], so a slow job never blocks the table.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use db::JobDao;
use job_core::{
    FinalizedJob, JobEvent, JobExecutionResult, JobId, JobOutput, JobOutputId, JobOutputResult,
    JobRequest, JobSpec, JobStatus, MissingOutput, OutputChannel, PersistedJob,
};
use ractor::{Actor, ActorProcessingErr, ActorRef};

use crate::config::JobManagerConfig;
use crate::executor::{ExecutionListeners, JobEventListeners, JobExecutor};
use crate::messages::{ManagerError, ManagerMessage, ManagerStats, Submission};
use crate::promise::{CancellablePromise, PromiseError};
use crate::stream::{Subscription, Topic};

pub const MSG_QUEUED: &str = "Queued by job manager";
pub const MSG_SUBMITTED_TO_EXECUTOR: &str = "Submitted to executor";
pub const MSG_FINISHED: &str = "Execution finished";
pub const MSG_ABORTED: &str = "Execution aborted";
pub const MSG_FAILED: &str = "Execution did not finish successfully";
pub const MSG_DEQUEUED_FOR_ABORT: &str = "Dequeued to be aborted";
pub const MSG_ABORTED_WHILE_QUEUED: &str = "Aborted while queued";
pub const MSG_OUTPUT_ERRORS: &str =
    "Job executed successfully, but there was an error handling the outputs";

enum Phase {
    Queued,
    Running {
        execution: CancellablePromise<JobExecutionResult>,
    },
}

/// A job between admission and its terminal status.
struct RunningEntry {
    job: PersistedJob,
    promise: CancellablePromise<FinalizedJob>,
    stdout: Topic<Bytes>,
    stderr: Topic<Bytes>,
    phase: Phase,
}

impl RunningEntry {
    fn console(&self, channel: OutputChannel) -> &Topic<Bytes> {
        match channel {
            OutputChannel::Stdout => &self.stdout,
            OutputChannel::Stderr => &self.stderr,
        }
    }

    fn close_console(&self) {
        self.stdout.close();
        self.stderr.close();
    }
}

/// Arguments for spawning the manager actor.
pub struct JobManagerArgs {
    pub dao: Arc<dyn JobDao>,
    pub executor: Arc<dyn JobExecutor>,
    pub config: JobManagerConfig,
    pub events: Topic<JobEvent>,
}

/// State for the job manager actor.
pub struct JobManagerState {
    dao: Arc<dyn JobDao>,
    executor: Arc<dyn JobExecutor>,
    config: JobManagerConfig,
    events: Topic<JobEvent>,
    entries: HashMap<JobId, RunningEntry>,
    /// Admission order of jobs still waiting for a slot.
    pending: VecDeque<JobId>,
    running: usize,
}

/// Outcome of matching a finished job's outputs against its declarations.
#[derive(Debug, Default)]
struct Reconciliation {
    /// One result per expected output, in declaration order.
    declared: Vec<JobOutputResult>,
    /// Present outputs no declaration asked for.
    undeclared: Vec<JobOutput>,
    missing_required: Vec<JobOutputId>,
}

fn reconcile(spec: &JobSpec, produced: Vec<JobOutputResult>) -> Reconciliation {
    let mut produced: Vec<Option<JobOutputResult>> = produced.into_iter().map(Some).collect();
    let mut reconciliation = Reconciliation::default();

    for expected in &spec.expected_outputs {
        let found = produced
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|r| r.id() == &expected.id))
            .and_then(Option::take);
        let result = found.unwrap_or_else(|| MissingOutput::from_expected(expected).into());

        if let JobOutputResult::Missing(missing) = &result
            && (missing.required || expected.required)
        {
            reconciliation.missing_required.push(missing.id.clone());
        }
        reconciliation.declared.push(result);
    }

    reconciliation.undeclared = produced
        .into_iter()
        .flatten()
        .filter_map(|result| match result {
            JobOutputResult::Output(output) => Some(output),
            JobOutputResult::Missing(_) => None,
        })
        .collect();

    reconciliation
}

/// Declared outputs of a job that produced nothing.
fn all_missing(spec: &JobSpec) -> Vec<JobOutputResult> {
    spec.expected_outputs
        .iter()
        .map(|expected| MissingOutput::from_expected(expected).into())
        .collect()
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Call the executor, turning a panic into a rejected promise.
fn invoke_executor(
    executor: &dyn JobExecutor,
    job: &PersistedJob,
    listeners: ExecutionListeners,
) -> CancellablePromise<JobExecutionResult> {
    match catch_unwind(AssertUnwindSafe(|| executor.execute(job, listeners))) {
        Ok(promise) => promise,
        Err(panic) => {
            let reason = panic_message(panic.as_ref());
            tracing::error!("Executor panicked while starting job {}: {}", job.id, reason);
            let promise = CancellablePromise::new();
            promise.fail(PromiseError::Rejected(format!("executor panicked: {reason}")));
            promise
        }
    }
}

/// Accumulate a console stream and persist it once the stream completes.
fn spawn_console_capture(
    dao: Arc<dyn JobDao>,
    job_id: JobId,
    channel: OutputChannel,
    mut updates: Subscription<Bytes>,
) {
    tokio::spawn(async move {
        let mut captured = BytesMut::new();
        while let Some(chunk) = updates.recv().await {
            captured.extend_from_slice(&chunk);
        }
        if captured.is_empty() {
            return;
        }
        if let Err(e) = dao
            .persist_console_output(job_id, channel, captured.freeze())
            .await
        {
            tracing::warn!("Failed to persist {} of job {}: {}", channel, job_id, e);
        }
    });
}

impl JobManagerState {
    fn new(args: JobManagerArgs) -> Self {
        Self {
            dao: args.dao,
            executor: args.executor,
            config: args.config,
            events: args.events,
            entries: HashMap::new(),
            pending: VecDeque::new(),
            running: 0,
        }
    }

    fn stats(&self) -> ManagerStats {
        ManagerStats {
            pending: self.pending.len(),
            running: self.running,
            max_running_jobs: self.config.max_running_jobs,
        }
    }

    /// Persist a transition, then broadcast it.
    async fn record_transition(&self, job_id: JobId, status: JobStatus, message: &str) {
        if let Err(e) = self.dao.add_new_job_status(job_id, status, message).await {
            tracing::warn!("Failed to persist status {} of job {}: {}", status, job_id, e);
        }
        tracing::debug!("Job {} -> {}: {}", job_id, status, message);
        self.events.publish(JobEvent::new(job_id, status, message));
    }

    async fn submit(
        &mut self,
        myself: &ActorRef<ManagerMessage>,
        request: JobRequest,
        listeners: JobEventListeners,
    ) -> Result<Submission, ManagerError> {
        let job = self.dao.persist(&request).await?;
        let job_id = job.id;

        let stdout = Topic::new();
        let stderr = Topic::new();
        if let Some(sink) = listeners.stdout {
            stdout.attach(sink);
        }
        if let Some(sink) = listeners.stderr {
            stderr.attach(sink);
        }
        spawn_console_capture(self.dao.clone(), job_id, OutputChannel::Stdout, stdout.subscribe());
        spawn_console_capture(self.dao.clone(), job_id, OutputChannel::Stderr, stderr.subscribe());

        let promise = CancellablePromise::new();
        let actor = myself.clone();
        promise.on_cancel(move || {
            if actor
                .send_message(ManagerMessage::CancelRequested { job_id })
                .is_err()
            {
                tracing::debug!("Cancel of job {} arrived after the manager stopped", job_id);
            }
        });

        self.entries.insert(
            job_id,
            RunningEntry {
                job,
                promise: promise.clone(),
                stdout,
                stderr,
                phase: Phase::Queued,
            },
        );
        self.pending.push_back(job_id);
        self.record_transition(job_id, JobStatus::Submitted, MSG_QUEUED)
            .await;

        Ok((job_id, promise))
    }

    /// Admit queued jobs while there is capacity.
    async fn advance_queue(&mut self, myself: &ActorRef<ManagerMessage>) {
        while self.running < self.config.max_running_jobs {
            let Some(job_id) = self.pending.pop_front() else {
                break;
            };
            self.start_execution(myself, job_id).await;
        }
    }

    async fn start_execution(&mut self, myself: &ActorRef<ManagerMessage>, job_id: JobId) {
        let Some(entry) = self.entries.get(&job_id) else {
            tracing::warn!("Queued job {} has no entry; skipping", job_id);
            return;
        };
        let job = entry.job.clone();
        let listeners = ExecutionListeners {
            stdout: entry.stdout.clone(),
            stderr: entry.stderr.clone(),
        };

        self.record_transition(job_id, JobStatus::Running, MSG_SUBMITTED_TO_EXECUTOR)
            .await;
        self.running += 1;

        let execution = invoke_executor(self.executor.as_ref(), &job, listeners);
        if let Some(entry) = self.entries.get_mut(&job_id) {
            entry.phase = Phase::Running {
                execution: execution.clone(),
            };
        }

        let actor = myself.clone();
        tokio::spawn(async move {
            let outcome = execution.get().await;
            if actor
                .send_message(ManagerMessage::ExecutionFinished { job_id, outcome })
                .is_err()
            {
                tracing::debug!("Job {} finished after the manager stopped", job_id);
            }
        });
    }

    async fn on_execution_finished(
        &mut self,
        job_id: JobId,
        outcome: Result<JobExecutionResult, PromiseError>,
    ) {
        let Some(entry) = self.entries.get(&job_id) else {
            tracing::debug!("Ignoring result for untracked job {}", job_id);
            return;
        };
        let spec = entry.job.request.spec.clone();

        let (status, message, outputs) = match outcome {
            Ok(result) => self.finalize(job_id, &spec, result).await,
            Err(e) => {
                tracing::warn!("Executor failed job {}: {}", job_id, e);
                (
                    JobStatus::FatalError,
                    format!("Executor failed: {e}"),
                    all_missing(&spec),
                )
            }
        };

        self.complete_job(job_id, status, message, outputs).await;
    }

    /// Decide the final status of a job the executor is done with, persisting
    /// outputs of finished jobs on the way.
    async fn finalize(
        &self,
        job_id: JobId,
        spec: &JobSpec,
        result: JobExecutionResult,
    ) -> (JobStatus, String, Vec<JobOutputResult>) {
        let reconciliation = reconcile(spec, result.outputs);

        match result.final_status {
            JobStatus::Finished => {
                let errors = self.persist_outputs(job_id, &reconciliation).await;
                if errors.is_empty() {
                    (JobStatus::Finished, MSG_FINISHED.to_string(), reconciliation.declared)
                } else {
                    (
                        JobStatus::FatalError,
                        format!("{MSG_OUTPUT_ERRORS}: {}", errors.join(", ")),
                        reconciliation.declared,
                    )
                }
            }
            JobStatus::Aborted => (
                JobStatus::Aborted,
                MSG_ABORTED.to_string(),
                reconciliation.declared,
            ),
            JobStatus::FatalError => (
                JobStatus::FatalError,
                MSG_FAILED.to_string(),
                reconciliation.declared,
            ),
            other @ (JobStatus::Submitted | JobStatus::Running) => (
                JobStatus::FatalError,
                format!("Executor reported non-terminal status {other}"),
                reconciliation.declared,
            ),
        }
    }

    /// Persist every present output. Returns the problems found, missing
    /// required outputs first.
    async fn persist_outputs(&self, job_id: JobId, reconciliation: &Reconciliation) -> Vec<String> {
        let mut errors: Vec<String> = reconciliation
            .missing_required
            .iter()
            .map(|id| format!("missing required output '{id}'"))
            .collect();

        let declared = reconciliation.declared.iter().filter_map(|r| match r {
            JobOutputResult::Output(output) => Some(output),
            JobOutputResult::Missing(_) => None,
        });
        for output in declared.chain(reconciliation.undeclared.iter()) {
            if let Err(e) = self.dao.persist_output(job_id, output).await {
                tracing::warn!("Failed to persist output {} of job {}: {}", output.id, job_id, e);
                errors.push(format!("could not persist output '{}': {e}", output.id));
            }
        }

        if !reconciliation.undeclared.is_empty() {
            tracing::debug!(
                "Job {} produced {} undeclared output(s)",
                job_id,
                reconciliation.undeclared.len()
            );
        }

        errors
    }

    /// Record the terminal status, drop the entry and resolve its promise.
    async fn complete_job(
        &mut self,
        job_id: JobId,
        status: JobStatus,
        message: String,
        outputs: Vec<JobOutputResult>,
    ) {
        if let Err(e) = self.dao.add_new_job_status(job_id, status, &message).await {
            tracing::warn!("Failed to persist status {} of job {}: {}", status, job_id, e);
        }

        let Some(entry) = self.entries.remove(&job_id) else {
            return;
        };
        if matches!(entry.phase, Phase::Running { .. }) {
            self.running = self.running.saturating_sub(1);
        }
        entry.close_console();

        tracing::info!("Job {} {}: {}", job_id, status, message);
        self.events.publish(JobEvent::new(job_id, status, message.clone()));

        entry.promise.complete(FinalizedJob {
            job_id,
            final_status: status,
            message,
            outputs,
        });
    }

    /// Signal cancellation to a running job, or drop a queued one.
    async fn try_abort(&mut self, job_id: JobId) -> bool {
        let Some(entry) = self.entries.get(&job_id) else {
            tracing::debug!("Abort requested for unknown or finished job {}", job_id);
            return false;
        };

        let outputs = match &entry.phase {
            Phase::Running { execution } => {
                let accepted = execution.cancel();
                tracing::debug!("Cancellation of job {} accepted: {}", job_id, accepted);
                return accepted;
            }
            Phase::Queued => all_missing(entry.job.spec()),
        };

        self.pending.retain(|id| *id != job_id);
        self.record_transition(job_id, JobStatus::Running, MSG_DEQUEUED_FOR_ABORT)
            .await;
        self.complete_job(
            job_id,
            JobStatus::Aborted,
            MSG_ABORTED_WHILE_QUEUED.to_string(),
            outputs,
        )
        .await;
        true
    }

    /// Reject everything still tracked; used when the actor stops.
    fn reject_all(&mut self, reason: &str) {
        self.pending.clear();
        for (job_id, entry) in self.entries.drain() {
            if let Phase::Running { execution } = &entry.phase {
                execution.cancel();
            }
            entry.close_console();
            entry
                .promise
                .fail(PromiseError::Rejected(format!("job {job_id}: {reason}")));
        }
        self.running = 0;
        self.events.close();
    }
}

/// Job manager actor that owns the job table.
pub struct JobManagerActor;

impl Actor for JobManagerActor {
    type Msg = ManagerMessage;
    type State = JobManagerState;
    type Arguments = JobManagerArgs;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        args: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::info!(
            "Starting job manager (max_running_jobs={})",
            args.config.max_running_jobs
        );
        Ok(JobManagerState::new(args))
    }

    async fn handle(
        &self,
        myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            ManagerMessage::Submit {
                request,
                listeners,
                reply,
            } => {
                let result = state.submit(&myself, *request, listeners).await;
                if result.is_ok() {
                    // Admit before replying so a free slot is already taken
                    // by the time the caller hears back.
                    state.advance_queue(&myself).await;
                }
                let _ = reply.send(result);
            }

            ManagerMessage::ExecutionFinished { job_id, outcome } => {
                state.on_execution_finished(job_id, outcome).await;
                state.advance_queue(&myself).await;
            }

            ManagerMessage::ConsoleUpdates {
                job_id,
                channel,
                reply,
            } => {
                let updates = state
                    .entries
                    .get(&job_id)
                    .map(|entry| entry.console(channel).subscribe());
                let _ = reply.send(updates);
            }

            ManagerMessage::TryAbort { job_id, reply } => {
                let accepted = state.try_abort(job_id).await;
                let _ = reply.send(accepted);
            }

            ManagerMessage::CancelRequested { job_id } => {
                state.try_abort(job_id).await;
            }

            ManagerMessage::GetStats { reply } => {
                let _ = reply.send(state.stats());
            }

            ManagerMessage::Shutdown => {
                tracing::info!("Shutting down job manager");
                myself.stop(None);
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let tracked = state.entries.len();
        if tracked > 0 {
            tracing::warn!("Job manager stopped with {} job(s) unresolved", tracked);
        }
        state.reject_all("job manager stopped");
        Ok(())
    }
}
