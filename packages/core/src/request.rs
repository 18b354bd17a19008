//! Job specifications and the requests built from them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::JobId;

/// Identifier of a declared output within a job spec.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobOutputId(String);

impl JobOutputId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for JobOutputId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl std::fmt::Display for JobOutputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An artifact a job is expected to leave behind in its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedOutput {
    pub id: JobOutputId,
    /// Path relative to the job's working directory.
    pub path: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ExpectedOutput {
    pub fn new(id: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: JobOutputId::new(id),
            path: path.into(),
            required: false,
            mime_type: None,
            name: None,
            description: None,
            metadata: HashMap::new(),
        }
    }

    /// Mark the output as required: the job fails if it is absent.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A file or directory made available in the working directory before the
/// application starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDependency {
    pub source: String,
    /// Path relative to the job's working directory.
    pub target: String,
    /// Symlink instead of copying.
    #[serde(default)]
    pub soft_link: bool,
}

/// How the job's application is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    pub application: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub dependencies: Vec<JobDependency>,
}

impl ExecutionConfig {
    pub fn new(application: impl Into<String>) -> Self {
        Self {
            application: application.into(),
            arguments: Vec::new(),
            dependencies: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn with_dependency(mut self, dependency: JobDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }
}

/// Declarative description of a kind of job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub expected_outputs: Vec<ExpectedOutput>,
}

impl JobSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>, execution: ExecutionConfig) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            execution,
            expected_outputs: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_expected_output(mut self, output: ExpectedOutput) -> Self {
        self.expected_outputs.push(output);
        self
    }

    pub fn expected_output(&self, id: &JobOutputId) -> Option<&ExpectedOutput> {
        self.expected_outputs.iter().find(|o| &o.id == id)
    }
}

/// A validated request to run a job. Never mutated once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub owner: String,
    pub name: String,
    pub spec: JobSpec,
    #[serde(default)]
    pub inputs: HashMap<String, serde_json::Value>,
}

impl JobRequest {
    pub fn new(owner: impl Into<String>, name: impl Into<String>, spec: JobSpec) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
            spec,
            inputs: HashMap::new(),
        }
    }

    pub fn with_input(mut self, id: impl Into<String>, value: serde_json::Value) -> Self {
        self.inputs.insert(id.into(), value);
        self
    }

    /// Copy of this request running a different spec.
    pub fn with_spec(&self, spec: JobSpec) -> Self {
        Self {
            spec,
            ..self.clone()
        }
    }
}

/// A request after it has been stored and given its canonical id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedJob {
    pub id: JobId,
    pub request: JobRequest,
    pub submitted_at: DateTime<Utc>,
}

impl PersistedJob {
    pub fn new(id: JobId, request: JobRequest) -> Self {
        Self {
            id,
            request,
            submitted_at: Utc::now(),
        }
    }

    pub fn spec(&self) -> &JobSpec {
        &self.request.spec
    }
}
