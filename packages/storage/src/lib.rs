//! Byte storage for job artifacts.
//!
//! Output files and captured stdout/stderr can be large, so they live in an
//! object store rather than in the database. Keys are derived from the job id:
//!
//! - `jobs/<job_id>/outputs/<output_id>`
//! - `jobs/<job_id>/stdout`
//! - `jobs/<job_id>/stderr`
//!
//! Backends come from `object_store`: local filesystem for real runs and
//! in-memory for tests.

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use job_core::{JobId, JobOutputId, OutputChannel};
use object_store::ObjectStore;
use object_store::ObjectStoreExt;
use object_store::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    #[error("invalid artifact key: {0}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("object_store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKind {
    Filesystem,
    Memory,
}

impl StorageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StorageKind::Filesystem => "filesystem",
            StorageKind::Memory => "memory",
        }
    }
}

#[derive(Debug, Clone)]
pub enum StorageBackendConfig {
    Filesystem { root: PathBuf },
    Memory,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackendConfig,
    /// Optional key prefix applied to all artifact keys.
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn memory() -> Self {
        Self {
            backend: StorageBackendConfig::Memory,
            prefix: None,
        }
    }

    pub fn filesystem(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackendConfig::Filesystem { root: root.into() },
            prefix: None,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = non_empty(prefix.into());
        self
    }

    /// Build a config from environment variables.
    ///
    /// - `ARTIFACT_BACKEND`: `memory` or `fs`/`filesystem` (default: `memory`)
    /// - `ARTIFACT_ROOT`: root directory for the filesystem backend
    ///   (default: `./data/artifacts`)
    /// - `ARTIFACT_PREFIX`: optional key prefix
    pub fn from_env() -> Result<Self, StorageError> {
        let backend = std::env::var("ARTIFACT_BACKEND").ok().and_then(non_empty);
        let prefix = std::env::var("ARTIFACT_PREFIX").ok().and_then(non_empty);

        let cfg = match backend.as_deref() {
            None | Some("memory") | Some("mem") => Self::memory(),
            Some("filesystem") | Some("fs") => {
                let root = std::env::var("ARTIFACT_ROOT")
                    .ok()
                    .and_then(non_empty)
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("./data/artifacts"));
                Self::filesystem(root)
            }
            Some(other) => {
                return Err(StorageError::InvalidConfig(format!(
                    "unsupported ARTIFACT_BACKEND={other} (expected memory|fs)"
                )));
            }
        };

        Ok(Self { prefix, ..cfg })
    }
}

/// Location of one artifact belonging to a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactKey {
    Output { job_id: JobId, output_id: JobOutputId },
    Console { job_id: JobId, channel: OutputChannel },
}

impl ArtifactKey {
    pub fn output(job_id: JobId, output_id: &JobOutputId) -> Self {
        ArtifactKey::Output {
            job_id,
            output_id: output_id.clone(),
        }
    }

    pub fn console(job_id: JobId, channel: OutputChannel) -> Self {
        ArtifactKey::Console { job_id, channel }
    }

    pub fn job_id(&self) -> JobId {
        match self {
            ArtifactKey::Output { job_id, .. } | ArtifactKey::Console { job_id, .. } => *job_id,
        }
    }

    fn relative(&self) -> Result<String, StorageError> {
        match self {
            ArtifactKey::Output { job_id, output_id } => {
                let id = output_id.as_str();
                if id.is_empty() || id.contains('/') || id == "." || id == ".." {
                    return Err(StorageError::InvalidKey(format!(
                        "output id {id:?} cannot be used as a key segment"
                    )));
                }
                Ok(format!("jobs/{job_id}/outputs/{id}"))
            }
            ArtifactKey::Console { job_id, channel } => Ok(format!("jobs/{job_id}/{channel}")),
        }
    }
}

impl std::fmt::Display for ArtifactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.relative() {
            Ok(key) => f.write_str(&key),
            Err(_) => write!(f, "jobs/{}/<invalid>", self.job_id()),
        }
    }
}

#[derive(Clone)]
pub struct ArtifactStore {
    kind: StorageKind,
    store: Arc<dyn ObjectStore>,
    prefix: Option<String>,
}

impl std::fmt::Debug for ArtifactStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactStore")
            .field("kind", &self.kind)
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ArtifactStore {
    pub fn kind(&self) -> StorageKind {
        self.kind
    }

    pub async fn new(cfg: StorageConfig) -> Result<Self, StorageError> {
        let (kind, store) = match cfg.backend {
            StorageBackendConfig::Filesystem { root } => {
                ensure_dir(&root)?;
                let fs = object_store::local::LocalFileSystem::new_with_prefix(&root)?;
                (StorageKind::Filesystem, Arc::new(fs) as _)
            }
            StorageBackendConfig::Memory => {
                let mem = object_store::memory::InMemory::new();
                (StorageKind::Memory, Arc::new(mem) as _)
            }
        };

        tracing::info!("Artifact store ready: {}", kind.as_str());

        Ok(Self {
            kind,
            store,
            prefix: cfg.prefix.and_then(non_empty),
        })
    }

    pub async fn from_env() -> Result<Self, StorageError> {
        Self::new(StorageConfig::from_env()?).await
    }

    fn to_path(&self, key: &ArtifactKey) -> Result<Path, StorageError> {
        let relative = key.relative()?;
        let joined = match self.prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{relative}"),
            _ => relative,
        };
        Ok(Path::from(joined))
    }

    /// Store bytes under `key`, replacing anything already there.
    pub async fn put(&self, key: &ArtifactKey, bytes: Bytes) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        tracing::debug!("Storing {} bytes at {}", bytes.len(), path);
        self.store
            .put(&path, object_store::PutPayload::from(bytes))
            .await?;
        Ok(())
    }

    /// Fetch the bytes stored under `key`, or `None` if nothing was stored.
    pub async fn get(&self, key: &ArtifactKey) -> Result<Option<Bytes>, StorageError> {
        let path = self.to_path(key)?;
        match self.store.get(&path).await {
            Ok(res) => Ok(Some(res.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn exists(&self, key: &ArtifactKey) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    pub async fn delete(&self, key: &ArtifactKey) -> Result<(), StorageError> {
        let path = self.to_path(key)?;
        match self.store.delete(&path).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn ensure_dir(root: &FsPath) -> Result<(), StorageError> {
    std::fs::create_dir_all(root)?;
    Ok(())
}

fn non_empty(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[tokio::test]
    async fn in_memory_output_round_trip() -> Result<(), StorageError> {
        let store = ArtifactStore::new(StorageConfig::memory()).await?;
        let job_id = JobId::new();
        let key = ArtifactKey::output(job_id, &JobOutputId::from("report"));

        assert_eq!(store.get(&key).await?, None);
        store.put(&key, Bytes::from("hi")).await?;
        assert_eq!(store.get(&key).await?, Some(Bytes::from("hi")));

        store.delete(&key).await?;
        assert!(!store.exists(&key).await?);
        Ok(())
    }

    #[tokio::test]
    async fn filesystem_console_output_lands_under_job_dir() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store = ArtifactStore::new(StorageConfig::filesystem(dir.path())).await?;
        let job_id = JobId::new();

        store
            .put(
                &ArtifactKey::console(job_id, OutputChannel::Stderr),
                Bytes::from("oops\n"),
            )
            .await?;

        let on_disk = dir.path().join(format!("jobs/{job_id}/stderr"));
        assert_eq!(std::fs::read(on_disk)?, b"oops\n");
        Ok(())
    }

    #[tokio::test]
    async fn prefix_is_applied_to_keys() -> Result<(), StorageError> {
        let dir = tempfile::tempdir()?;
        let store =
            ArtifactStore::new(StorageConfig::filesystem(dir.path()).with_prefix("/tenant-a/"))
                .await?;
        let job_id = JobId::new();

        store
            .put(
                &ArtifactKey::output(job_id, &JobOutputId::from("out")),
                Bytes::from("x"),
            )
            .await?;

        assert!(dir
            .path()
            .join(format!("tenant-a/jobs/{job_id}/outputs/out"))
            .exists());
        Ok(())
    }

    #[tokio::test]
    async fn output_ids_cannot_escape_the_job_dir() -> Result<(), StorageError> {
        let store = ArtifactStore::new(StorageConfig::memory()).await?;
        let key = ArtifactKey::output(JobId::new(), &JobOutputId::from("../other"));

        let err = store.put(&key, Bytes::from("x")).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
        Ok(())
    }
}
