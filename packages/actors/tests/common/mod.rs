#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actors::{
    CancellablePromise, ExecutionListeners, JobExecutor, JobManager, JobManagerConfig,
    Subscription,
};
use bytes::Bytes;
use db::{DaoFuture, DbError, JobDao};
use job_core::{
    ExecutionConfig, ExpectedOutput, JobEvent, JobExecutionResult, JobId, JobOutput, JobOutputId,
    JobRequest, JobSpec, JobStatus, OutputChannel, PersistedJob,
};
use tokio::sync::mpsc;

pub const TIMEOUT: Duration = Duration::from_secs(5);

/// One call the manager made into a [`RecordingDao`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaoCall {
    Persist,
    Status(JobStatus),
    Output(JobOutputId),
    Console(OutputChannel),
}

/// DAO that keeps every call in memory.
#[derive(Default)]
pub struct RecordingDao {
    fail_persist: AtomicBool,
    fail_outputs: AtomicBool,
    calls: Mutex<Vec<(JobId, DaoCall)>>,
    persisted: Mutex<Vec<PersistedJob>>,
    statuses: Mutex<Vec<(JobId, JobStatus, String)>>,
    outputs: Mutex<Vec<(JobId, JobOutput)>>,
    console: Mutex<Vec<(JobId, OutputChannel, Bytes)>>,
}

impl RecordingDao {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_persist() -> Arc<Self> {
        let dao = Self::default();
        dao.fail_persist.store(true, Ordering::SeqCst);
        Arc::new(dao)
    }

    /// Rejects every `persist_output` call.
    pub fn failing_outputs() -> Arc<Self> {
        let dao = Self::default();
        dao.fail_outputs.store(true, Ordering::SeqCst);
        Arc::new(dao)
    }

    fn record(&self, job_id: JobId, call: DaoCall) {
        self.calls.lock().unwrap().push((job_id, call));
    }

    /// Every call made for `job_id`, in the order the manager made them.
    pub fn calls_of(&self, job_id: JobId) -> Vec<DaoCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn persisted_ids(&self) -> Vec<JobId> {
        self.persisted.lock().unwrap().iter().map(|j| j.id).collect()
    }

    pub fn statuses_of(&self, job_id: JobId) -> Vec<(JobStatus, String)> {
        self.statuses
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _, _)| *id == job_id)
            .map(|(_, status, message)| (*status, message.clone()))
            .collect()
    }

    pub fn outputs_of(&self, job_id: JobId) -> Vec<JobOutput> {
        self.outputs
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == job_id)
            .map(|(_, output)| output.clone())
            .collect()
    }

    pub fn console_of(&self, job_id: JobId, channel: OutputChannel) -> Option<Bytes> {
        self.console
            .lock()
            .unwrap()
            .iter()
            .find(|(id, ch, _)| *id == job_id && *ch == channel)
            .map(|(_, _, data)| data.clone())
    }
}

impl JobDao for RecordingDao {
    fn persist<'a>(&'a self, request: &'a JobRequest) -> DaoFuture<'a, PersistedJob> {
        Box::pin(async move {
            if self.fail_persist.load(Ordering::SeqCst) {
                return Err(DbError::Query("disk full".to_string()));
            }
            let job = PersistedJob::new(JobId::new(), request.clone());
            self.record(job.id, DaoCall::Persist);
            self.persisted.lock().unwrap().push(job.clone());
            Ok(job)
        })
    }

    fn add_new_job_status<'a>(
        &'a self,
        job_id: JobId,
        status: JobStatus,
        message: &'a str,
    ) -> DaoFuture<'a, ()> {
        Box::pin(async move {
            self.record(job_id, DaoCall::Status(status));
            self.statuses
                .lock()
                .unwrap()
                .push((job_id, status, message.to_string()));
            Ok(())
        })
    }

    fn persist_output<'a>(
        &'a self,
        job_id: JobId,
        output: &'a JobOutput,
    ) -> DaoFuture<'a, ()> {
        Box::pin(async move {
            if self.fail_outputs.load(Ordering::SeqCst) {
                return Err(DbError::Query("bucket unavailable".to_string()));
            }
            self.record(job_id, DaoCall::Output(output.id.clone()));
            self.outputs.lock().unwrap().push((job_id, output.clone()));
            Ok(())
        })
    }

    fn persist_console_output(
        &self,
        job_id: JobId,
        channel: OutputChannel,
        data: Bytes,
    ) -> DaoFuture<'_, ()> {
        Box::pin(async move {
            self.record(job_id, DaoCall::Console(channel));
            self.console.lock().unwrap().push((job_id, channel, data));
            Ok(())
        })
    }
}

/// One call the manager made into a [`ControlledExecutor`].
#[derive(Clone)]
pub struct Execution {
    pub job: PersistedJob,
    pub listeners: ExecutionListeners,
    pub promise: CancellablePromise<JobExecutionResult>,
}

impl Execution {
    pub fn finish(&self, result: JobExecutionResult) {
        self.promise.complete(result);
    }

    pub fn finish_with(&self, status: JobStatus) {
        self.finish(JobExecutionResult::new(status));
    }
}

/// Executor whose jobs only end when the test says so.
pub struct ControlledExecutor {
    started: mpsc::UnboundedSender<Execution>,
    abort_on_cancel: bool,
    invocations: AtomicUsize,
}

impl ControlledExecutor {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Execution>) {
        Self::build(false)
    }

    /// Resolves a job with `ABORTED` as soon as its cancellation is requested.
    pub fn aborting_on_cancel() -> (Arc<Self>, mpsc::UnboundedReceiver<Execution>) {
        Self::build(true)
    }

    fn build(abort_on_cancel: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<Execution>) {
        let (started, rx) = mpsc::unbounded_channel();
        let executor = Self {
            started,
            abort_on_cancel,
            invocations: AtomicUsize::new(0),
        };
        (Arc::new(executor), rx)
    }

    pub fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl JobExecutor for ControlledExecutor {
    fn execute(
        &self,
        job: &PersistedJob,
        listeners: ExecutionListeners,
    ) -> CancellablePromise<JobExecutionResult> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        let promise = CancellablePromise::new();

        if self.abort_on_cancel {
            let on_cancel = promise.clone();
            promise.on_cancel(move || {
                on_cancel.complete(JobExecutionResult::new(JobStatus::Aborted));
            });
        }

        let _ = self.started.send(Execution {
            job: job.clone(),
            listeners,
            promise: promise.clone(),
        });
        promise
    }
}

pub async fn next_execution(started: &mut mpsc::UnboundedReceiver<Execution>) -> Execution {
    tokio::time::timeout(TIMEOUT, started.recv())
        .await
        .expect("executor was not invoked in time")
        .expect("executor dropped")
}

/// Executor that immediately resolves every job with `result`.
pub fn resolving_executor(result: JobExecutionResult) -> Arc<dyn JobExecutor> {
    Arc::new(actors::FnExecutor::new(move |_, _| {
        CancellablePromise::resolved(result.clone())
    }))
}

/// Executor that immediately resolves every job with `status` and no outputs.
pub fn resolving_with(status: JobStatus) -> Arc<dyn JobExecutor> {
    resolving_executor(JobExecutionResult::new(status))
}

pub fn request() -> JobRequest {
    request_with_outputs(Vec::new())
}

pub fn request_with_outputs(outputs: Vec<ExpectedOutput>) -> JobRequest {
    let mut spec = JobSpec::new("test-spec", "Test spec", ExecutionConfig::new("true"));
    spec.expected_outputs = outputs;
    JobRequest::new("tester", "test job", spec)
}

pub async fn start_manager(
    dao: Arc<RecordingDao>,
    executor: Arc<dyn JobExecutor>,
    max_running_jobs: usize,
) -> JobManager {
    let (manager, _handle) =
        JobManager::start(dao, executor, JobManagerConfig::new(max_running_jobs))
            .await
            .expect("manager starts");
    manager
}

/// Read events until `job_id` has reached a terminal status.
pub async fn statuses_until_terminal(
    events: &mut Subscription<JobEvent>,
    job_id: JobId,
) -> Vec<JobStatus> {
    let mut seen = Vec::new();
    loop {
        let event = tokio::time::timeout(TIMEOUT, events.recv())
            .await
            .expect("terminal event in time")
            .expect("event stream open");
        if event.job_id != job_id {
            continue;
        }
        seen.push(event.new_status);
        if event.is_terminal() {
            return seen;
        }
    }
}
