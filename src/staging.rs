//! A short-lived per-job directory under a single fixed base, with path-traversal
//! defense on every write and guaranteed cleanup on drop.

use std::fs;
use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::error::CoreError;

/// A temporary directory exclusively owned by one coordinator invocation. Destroyed via
/// `Drop` so every exit path (success, an early `?`, or a panic unwind) removes it;
/// cleanup failures are logged, never propagated.
pub struct JobDir {
    path: PathBuf,
}

impl JobDir {
    /// Creates a fresh, uniquely-named directory under `<base>/exec/`. `base` must already
    /// exist and be writable.
    pub fn create(base: &Path) -> Result<Self, CoreError> {
        let exec_root = base.join("exec");
        fs::create_dir_all(&exec_root)
            .map_err(|e| CoreError::JobDirCreation(format!("{}: {e}", exec_root.display())))?;

        let dir = exec_root.join(Uuid::new_v4().to_string());
        fs::create_dir(&dir)
            .map_err(|e| CoreError::JobDirCreation(format!("{}: {e}", dir.display())))?;

        let canonical = dir
            .canonicalize()
            .map_err(|e| CoreError::JobDirCreation(format!("{}: {e}", dir.display())))?;

        log::info!("created job directory: {}", canonical.display());
        Ok(Self { path: canonical })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `content` at `self.path / relative_path`, creating parent directories as
    /// needed. Resolves the target with OS-level canonicalization (symlinks collapsed)
    /// and rejects anything that escapes `self.path` as `UnsafePath`.
    pub fn write(&self, relative_path: &str, content: &str) -> Result<PathBuf, CoreError> {
        let candidate = self.path.join(relative_path);
        let file_name = candidate
            .file_name()
            .ok_or_else(|| CoreError::UnsafePath(format!("no file name in {relative_path}")))?
            .to_owned();
        let parent = candidate.parent().ok_or_else(|| {
            CoreError::UnsafePath(format!("no parent directory for {relative_path}"))
        })?;

        fs::create_dir_all(parent).map_err(|e| CoreError::FileWrite(e.to_string()))?;

        let canonical_parent = parent
            .canonicalize()
            .map_err(|e| CoreError::FileWrite(e.to_string()))?;
        if !canonical_parent.starts_with(&self.path) {
            return Err(CoreError::UnsafePath(format!(
                "{relative_path} escapes job directory"
            )));
        }

        let target = canonical_parent.join(file_name);
        fs::write(&target, content).map_err(|e| CoreError::FileWrite(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(0o644))
                .map_err(|e| CoreError::FileWrite(e.to_string()))?;
        }

        Ok(target)
    }
}

impl Drop for JobDir {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "failed to clean up job directory {}: {e}",
                    self.path.display()
                );
            }
        } else {
            log::info!("cleaned up job directory: {}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_makes_a_unique_directory_under_exec() {
        let base = tempfile::tempdir().unwrap();
        let job = JobDir::create(base.path()).unwrap();
        assert!(job.path().exists());
        assert!(job
            .path()
            .starts_with(base.path().canonicalize().unwrap().join("exec")));

        let job2 = JobDir::create(base.path()).unwrap();
        assert_ne!(job.path(), job2.path());
    }

    #[test]
    fn write_places_file_inside_job_dir() {
        let base = tempfile::tempdir().unwrap();
        let job = JobDir::create(base.path()).unwrap();
        let written = job.write("main.py", "print(1)").unwrap();
        assert_eq!(fs::read_to_string(&written).unwrap(), "print(1)");
        assert!(written.starts_with(job.path()));
    }

    #[test]
    fn write_rejects_traversal_outside_job_dir() {
        let base = tempfile::tempdir().unwrap();
        let job = JobDir::create(base.path()).unwrap();
        let err = job.write("../escape.txt", "x").unwrap_err();
        assert!(matches!(err, CoreError::UnsafePath(_)));
    }

    #[test]
    fn drop_removes_the_directory() {
        let base = tempfile::tempdir().unwrap();
        let path = {
            let job = JobDir::create(base.path()).unwrap();
            job.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
