//! What an executor reports back once a job's work is done.

use std::collections::HashMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ExpectedOutput, JobOutputId, JobStatus};

pub const DEFAULT_BINARY_MIME_TYPE: &str = "application/octet-stream";

/// Raw bytes plus the MIME type they should be served as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryData {
    pub data: Bytes,
    pub mime_type: String,
}

impl BinaryData {
    pub fn new(data: impl Into<Bytes>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
        }
    }

    /// Wrap bytes with the default binary MIME type.
    pub fn wrap(data: impl Into<Bytes>) -> Self {
        Self::new(data, DEFAULT_BINARY_MIME_TYPE)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// A declared output that exists after execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub id: JobOutputId,
    pub data: BinaryData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new(id: impl Into<String>, data: BinaryData) -> Self {
        Self {
            id: JobOutputId::new(id),
            data,
            name: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    /// Build an output carrying the descriptive fields of its declaration.
    pub fn from_expected(expected: &ExpectedOutput, data: BinaryData) -> Self {
        Self {
            id: expected.id.clone(),
            data,
            name: expected.name.clone(),
            description: expected.description.clone(),
            metadata: expected.metadata.clone(),
        }
    }
}

/// A declared output that does not exist after execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingOutput {
    pub id: JobOutputId,
    pub required: bool,
    pub path: String,
}

impl MissingOutput {
    pub fn from_expected(expected: &ExpectedOutput) -> Self {
        Self {
            id: expected.id.clone(),
            required: expected.required,
            path: expected.path.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobOutputResult {
    Output(JobOutput),
    Missing(MissingOutput),
}

impl JobOutputResult {
    pub fn id(&self) -> &JobOutputId {
        match self {
            JobOutputResult::Output(output) => &output.id,
            JobOutputResult::Missing(missing) => &missing.id,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, JobOutputResult::Missing(_))
    }
}

impl From<JobOutput> for JobOutputResult {
    fn from(output: JobOutput) -> Self {
        JobOutputResult::Output(output)
    }
}

impl From<MissingOutput> for JobOutputResult {
    fn from(missing: MissingOutput) -> Self {
        JobOutputResult::Missing(missing)
    }
}

/// Produced once by an executor when the underlying work completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobExecutionResult {
    pub final_status: JobStatus,
    #[serde(default)]
    pub outputs: Vec<JobOutputResult>,
}

impl JobExecutionResult {
    pub fn new(final_status: JobStatus) -> Self {
        Self {
            final_status,
            outputs: Vec::new(),
        }
    }

    pub fn with_outputs(final_status: JobStatus, outputs: Vec<JobOutputResult>) -> Self {
        Self {
            final_status,
            outputs,
        }
    }

    pub fn fatal() -> Self {
        Self::new(JobStatus::FatalError)
    }

    pub fn output(&self, id: &JobOutputId) -> Option<&JobOutputResult> {
        self.outputs.iter().find(|o| o.id() == id)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn output_results_are_tagged() {
        let missing: JobOutputResult = MissingOutput {
            id: JobOutputId::from("report"),
            required: true,
            path: "report.pdf".into(),
        }
        .into();

        let json = serde_json::to_value(&missing).unwrap();
        assert_eq!(json["kind"], "missing");
        assert_eq!(json["id"], "report");
        assert!(missing.is_missing());
    }

    #[test]
    fn from_expected_copies_descriptive_fields() {
        let expected = ExpectedOutput::new("log", "log.txt")
            .with_name("Log")
            .with_metadata("lang", "en");
        let output = JobOutput::from_expected(&expected, BinaryData::wrap("abc"));

        assert_eq!(output.id.as_str(), "log");
        assert_eq!(output.name.as_deref(), Some("Log"));
        assert_eq!(output.metadata["lang"], "en");
        assert_eq!(output.data.mime_type, DEFAULT_BINARY_MIME_TYPE);
    }
}
