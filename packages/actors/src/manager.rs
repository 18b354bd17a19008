//! Public handle to a running job manager.

use std::sync::Arc;

use bytes::Bytes;
use db::JobDao;
use job_core::{JobEvent, JobId, JobRequest, OutputChannel};
use ractor::{Actor, ActorRef, RpcReplyPort};
use tokio::task::JoinHandle;

use crate::config::JobManagerConfig;
use crate::executor::{JobEventListeners, JobExecutor};
use crate::manager_actor::{JobManagerActor, JobManagerArgs};
use crate::messages::{ManagerError, ManagerMessage, ManagerStats, Submission};
use crate::stream::{Subscription, Topic};

/// Accepts jobs, runs them through an executor under a concurrency cap and
/// reports on their progress.
///
/// Cheap to clone; every clone talks to the same manager.
#[derive(Clone)]
pub struct JobManager {
    actor: ActorRef<ManagerMessage>,
    events: Topic<JobEvent>,
}

impl std::fmt::Debug for JobManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobManager")
            .field("actor", &self.actor.get_id())
            .finish()
    }
}

impl JobManager {
    /// Spawn the manager actor.
    ///
    /// The returned join handle completes once the manager has stopped.
    pub async fn start(
        dao: Arc<dyn JobDao>,
        executor: Arc<dyn JobExecutor>,
        config: JobManagerConfig,
    ) -> Result<(Self, JoinHandle<()>), ManagerError> {
        config.validate()?;

        let events = Topic::new();
        let args = JobManagerArgs {
            dao,
            executor,
            config,
            events: events.clone(),
        };

        let (actor, handle) = Actor::spawn(None, JobManagerActor, args)
            .await
            .map_err(|e| ManagerError::Spawn(e.to_string()))?;

        Ok((Self { actor, events }, handle))
    }

    async fn call<T>(
        &self,
        message: impl FnOnce(RpcReplyPort<T>) -> ManagerMessage,
    ) -> Result<T, ManagerError>
    where
        T: Send + 'static,
    {
        let (tx, rx) = ractor::concurrency::oneshot();
        self.actor
            .send_message(message(tx.into()))
            .map_err(|_| ManagerError::Unavailable("mailbox closed".to_string()))?;
        rx.await
            .map_err(|_| ManagerError::Unavailable("stopped before replying".to_string()))
    }

    /// Submit a job without console listeners.
    pub async fn submit(&self, request: JobRequest) -> Result<Submission, ManagerError> {
        self.submit_with_listeners(request, JobEventListeners::none())
            .await
    }

    /// Persist `request`, queue it and return its id with a promise for the
    /// outcome.
    ///
    /// Errors only when the request could not be persisted or the manager is
    /// gone. A job that fails to run still resolves its promise normally,
    /// with `FATAL_ERROR`. Cancelling the promise asks for the job to be
    /// aborted.
    pub async fn submit_with_listeners(
        &self,
        request: JobRequest,
        listeners: JobEventListeners,
    ) -> Result<Submission, ManagerError> {
        self.call(|reply| ManagerMessage::Submit {
            request: Box::new(request),
            listeners,
            reply,
        })
        .await?
    }

    /// Every status transition of every job from now on.
    pub fn all_job_status_changes(&self) -> Subscription<JobEvent> {
        self.events.subscribe()
    }

    /// Live stdout of a job, or `None` if it is unknown or already terminal.
    pub async fn stdout_updates(&self, job_id: JobId) -> Option<Subscription<Bytes>> {
        self.console_updates(job_id, OutputChannel::Stdout).await
    }

    /// Live stderr of a job, or `None` if it is unknown or already terminal.
    pub async fn stderr_updates(&self, job_id: JobId) -> Option<Subscription<Bytes>> {
        self.console_updates(job_id, OutputChannel::Stderr).await
    }

    async fn console_updates(
        &self,
        job_id: JobId,
        channel: OutputChannel,
    ) -> Option<Subscription<Bytes>> {
        self.call(|reply| ManagerMessage::ConsoleUpdates {
            job_id,
            channel,
            reply,
        })
        .await
        .ok()
        .flatten()
    }

    /// Ask for a job to be aborted.
    ///
    /// `true` means the request was accepted, not that the job will end up
    /// `ABORTED`; `false` means the job is unknown or already terminal.
    pub async fn try_abort(&self, job_id: JobId) -> bool {
        self.call(|reply| ManagerMessage::TryAbort { job_id, reply })
            .await
            .unwrap_or(false)
    }

    pub async fn stats(&self) -> Result<ManagerStats, ManagerError> {
        self.call(|reply| ManagerMessage::GetStats { reply }).await
    }

    /// Stop the manager. Unresolved promises are rejected and running jobs
    /// are asked to stop.
    pub fn shutdown(&self) {
        if self.actor.send_message(ManagerMessage::Shutdown).is_err() {
            tracing::debug!("Job manager already stopped");
        }
    }
}
