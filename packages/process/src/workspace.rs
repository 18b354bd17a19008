//! Per-job working directories.

use std::io;
use std::path::{Component, Path, PathBuf};

use job_core::{JobDependency, JobId};
use tracing::{debug, warn};

use crate::error::ExecutorError;

/// Create the job's working directory and stage its dependencies in it.
pub(crate) async fn prepare(
    job_id: JobId,
    working_dir: &Path,
    dependencies: &[JobDependency],
) -> Result<(), ExecutorError> {
    tokio::fs::create_dir_all(working_dir)
        .await
        .map_err(|e| ExecutorError::io(format!("cannot create {}", working_dir.display()), e))?;
    debug!("Job {}: created working directory {}", job_id, working_dir.display());

    for dependency in dependencies {
        stage_dependency(job_id, working_dir, dependency).await?;
    }
    Ok(())
}

async fn stage_dependency(
    job_id: JobId,
    working_dir: &Path,
    dependency: &JobDependency,
) -> Result<(), ExecutorError> {
    let source = PathBuf::from(&dependency.source);
    let target = resolve_inside(working_dir, &dependency.target).ok_or_else(|| {
        ExecutorError::InvalidDependency {
            target: dependency.target.clone(),
            reason: "must be a relative path inside the working directory".to_string(),
        }
    })?;

    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ExecutorError::io(format!("cannot create {}", parent.display()), e))?;
    }

    if dependency.soft_link {
        debug!("Job {}: linking {} -> {}", job_id, source.display(), target.display());
        // A broken link only surfaces once the application uses it.
        if let Err(e) = symlink(&source, &target).await {
            warn!("Job {}: cannot link {}: {}", job_id, source.display(), e);
        }
        return Ok(());
    }

    debug!("Job {}: copying {} -> {}", job_id, source.display(), target.display());
    let (from, to) = (source.clone(), target);
    tokio::task::spawn_blocking(move || copy_path(&from, &to))
        .await
        .map_err(|e| ExecutorError::io("copy task failed", io::Error::other(e)))?
        .map_err(|e| ExecutorError::io(format!("cannot copy {}", source.display()), e))
}

/// Join `relative` onto `root`, refusing absolute paths and `..`.
pub(crate) fn resolve_inside(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    let mut parts = relative.components().peekable();
    parts.peek()?;
    if parts.all(|c| matches!(c, Component::Normal(_) | Component::CurDir)) {
        Some(root.join(relative))
    } else {
        None
    }
}

/// Recursively copy a file or directory, keeping permissions.
fn copy_path(source: &Path, target: &Path) -> io::Result<()> {
    let metadata = std::fs::metadata(source)?;
    if metadata.is_dir() {
        std::fs::create_dir_all(target)?;
        for entry in std::fs::read_dir(source)? {
            let entry = entry?;
            copy_path(&entry.path(), &target.join(entry.file_name()))?;
        }
        std::fs::set_permissions(target, metadata.permissions())
    } else {
        std::fs::copy(source, target).map(|_| ())
    }
}

#[cfg(unix)]
async fn symlink(source: &Path, target: &Path) -> io::Result<()> {
    tokio::fs::symlink(source, target).await
}

#[cfg(not(unix))]
async fn symlink(_source: &Path, _target: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "soft links are only supported on unix",
    ))
}

/// Delete a finished job's working directory.
pub(crate) async fn remove(job_id: JobId, working_dir: &Path) {
    match tokio::fs::remove_dir_all(working_dir).await {
        Ok(()) => debug!("Job {}: removed working directory", job_id),
        Err(e) => warn!(
            "Tried to remove working directory {} of job {}, but couldn't: {}",
            working_dir.display(),
            job_id,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::disallowed_methods)]

    use super::*;

    #[test]
    fn test_resolve_inside() {
        let root = Path::new("/wd");
        assert_eq!(resolve_inside(root, "a/b.txt"), Some(PathBuf::from("/wd/a/b.txt")));
        assert_eq!(resolve_inside(root, "./c"), Some(PathBuf::from("/wd/./c")));
        assert_eq!(resolve_inside(root, "../escape"), None);
        assert_eq!(resolve_inside(root, "/etc/passwd"), None);
        assert_eq!(resolve_inside(root, ""), None);
    }

    #[test]
    fn test_copy_directory_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("src");
        std::fs::create_dir_all(source.join("nested")).unwrap();
        std::fs::write(source.join("top.txt"), "top").unwrap();
        std::fs::write(source.join("nested/inner.txt"), "inner").unwrap();

        let target = tmp.path().join("dst");
        copy_path(&source, &target).unwrap();

        assert_eq!(std::fs::read_to_string(target.join("top.txt")).unwrap(), "top");
        assert_eq!(
            std::fs::read_to_string(target.join("nested/inner.txt")).unwrap(),
            "inner"
        );
    }
}
