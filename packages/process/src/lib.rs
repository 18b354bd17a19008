//! Runs jobs as local subprocesses.
//!
//! Each job gets its own working directory under the configured root. The
//! job's dependencies are copied or linked into it, the application is
//! spawned there, its console output is streamed to the manager and the
//! declared outputs are collected from the directory once it exits.

mod config;
mod error;
mod executor;
mod outputs;
mod workspace;

pub use config::LocalExecutorConfig;
pub use error::ExecutorError;
pub use executor::LocalJobExecutor;
pub use outputs::guess_mime_type;
