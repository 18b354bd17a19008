//! Core domain types for the job execution manager.
//!
//! This crate contains shared types used across all packages:
//! - JobId and JobStatus for job identity and lifecycle
//! - JobSpec, JobRequest and PersistedJob for submitted work
//! - JobOutputResult and JobExecutionResult for what an executor produced
//! - JobEvent for status-change broadcasts

mod events;
mod job;
mod output;
mod request;

pub use events::JobEvent;
pub use job::{FinalizedJob, JobId, JobStatus, OutputChannel, StatusParseError};
pub use output::{
    BinaryData, DEFAULT_BINARY_MIME_TYPE, JobExecutionResult, JobOutput, JobOutputResult,
    MissingOutput,
};
pub use request::{
    ExecutionConfig, ExpectedOutput, JobDependency, JobOutputId, JobRequest, JobSpec,
    PersistedJob,
};
