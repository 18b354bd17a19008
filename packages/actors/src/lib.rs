//! Job execution manager.
//!
//! This crate provides the building blocks and the Ractor-based manager that
//! runs jobs through a pluggable executor.
//!
//! # Architecture
//!
//! - [`CancellablePromise`] - write-once result handle with cooperative cancellation
//! - [`Topic`] / [`Subscription`] - hot multicast streams for events and console bytes
//! - [`JobExecutor`] - the contract an executor implements
//! - [`JobManager`] - handle to the actor that owns the job table, the bounded
//!   run queue and output reconciliation
//!
//! # Usage
//!
//! ```ignore
//! use actors::{JobManager, JobManagerConfig};
//!
//! let (manager, _handle) = JobManager::start(dao, executor, JobManagerConfig::default()).await?;
//! let (job_id, promise) = manager.submit(request).await?;
//! let finalized = promise.get().await?;
//! ```

mod config;
mod executor;
mod manager;
mod manager_actor;
mod messages;
mod promise;
mod stream;

pub use config::JobManagerConfig;
pub use executor::{ExecutionListeners, FnExecutor, JobEventListeners, JobExecutor};
pub use manager::JobManager;
pub use manager_actor::{
    MSG_ABORTED, MSG_ABORTED_WHILE_QUEUED, MSG_DEQUEUED_FOR_ABORT, MSG_FAILED, MSG_FINISHED,
    MSG_OUTPUT_ERRORS, MSG_QUEUED, MSG_SUBMITTED_TO_EXECUTOR,
};
pub use messages::{ManagerError, ManagerStats, Submission};
pub use promise::{CancellablePromise, PromiseError};
pub use stream::{Subscription, Topic};
