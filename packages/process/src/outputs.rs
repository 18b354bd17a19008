//! Collecting declared outputs from a job's working directory.

use std::io;
use std::path::Path;

use job_core::{
    BinaryData, DEFAULT_BINARY_MIME_TYPE, ExpectedOutput, JobId, JobOutput, JobOutputResult,
    MissingOutput,
};
use tracing::warn;

use crate::workspace::resolve_inside;

const MIME_TYPES: &[(&str, &str)] = &[
    ("txt", "text/plain"),
    ("log", "text/plain"),
    ("csv", "text/csv"),
    ("html", "text/html"),
    ("htm", "text/html"),
    ("xml", "application/xml"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("xls", "application/vnd.ms-excel"),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
];

/// MIME type for a path based on its extension, if it is a known one.
pub fn guess_mime_type(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    MIME_TYPES
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}

/// One result per declared output, in declaration order.
pub(crate) async fn collect(
    job_id: JobId,
    working_dir: &Path,
    expected: &[ExpectedOutput],
) -> Vec<JobOutputResult> {
    let mut results = Vec::with_capacity(expected.len());
    for output in expected {
        results.push(collect_one(job_id, working_dir, output).await);
    }
    results
}

async fn collect_one(
    job_id: JobId,
    working_dir: &Path,
    expected: &ExpectedOutput,
) -> JobOutputResult {
    let Some(path) = resolve_inside(working_dir, &expected.path) else {
        warn!(
            "Job {}: output '{}' has a path outside the working directory: {}",
            job_id, expected.id, expected.path
        );
        return MissingOutput::from_expected(expected).into();
    };

    match tokio::fs::read(&path).await {
        Ok(data) => {
            let mime_type = expected
                .mime_type
                .clone()
                .or_else(|| guess_mime_type(&path).map(str::to_string))
                .unwrap_or_else(|| DEFAULT_BINARY_MIME_TYPE.to_string());
            JobOutput::from_expected(expected, BinaryData::new(data, mime_type)).into()
        }
        Err(e) => {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("Job {}: cannot read output '{}': {}", job_id, expected.id, e);
            }
            MissingOutput::from_expected(expected).into()
        }
    }
}
