//! Repository implementations for database operations.

mod job_repo;
mod output_repo;
mod status_repo;

pub use job_repo::JobRepository;
pub use output_repo::{OutputMetadata, OutputRepository};
pub use status_repo::{JobStatusChange, StatusRepository};
