//! The task executed by worker processes. Composes the language registry, rewriter,
//! staging, and invoker into the two supported job shapes.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::error::ErrorKind;
use crate::invoker::{ContainerInvoker, Mount, ResourceLimits, RunResult};
use crate::language::Language;
use crate::model::OutputFileEntry;
use crate::staging::JobDir;

/// The coordinator's final record: a `RunResult` plus enumerated output files.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: Option<i32>,
    pub error: Option<ErrorKind>,
    pub output_files: Vec<OutputFileEntry>,
}

impl TaskResult {
    fn from_run_result(run: RunResult) -> Self {
        Self {
            stdout: run.stdout,
            stderr: run.stderr,
            returncode: run.returncode,
            error: run.error,
            output_files: Vec::new(),
        }
    }

    fn error(kind: ErrorKind) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            returncode: None,
            error: Some(kind),
            output_files: Vec::new(),
        }
    }

    fn unsupported_language() -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            returncode: Some(2),
            error: Some(ErrorKind::UnsupportedLanguage),
            output_files: Vec::new(),
        }
    }
}

/// Composes the language registry, job staging, and container invoker into the two
/// supported job shapes. Holds no per-job state; safe to share across workers via `Arc`.
pub struct JobCoordinator {
    config: Arc<AppConfig>,
    invoker: ContainerInvoker,
}

impl JobCoordinator {
    pub fn new(config: Arc<AppConfig>) -> Self {
        let invoker = ContainerInvoker::new(config.sandbox_image.clone(), config.truncation_cap);
        Self { config, invoker }
    }

    /// Runs code with no declared input or output files: no storage mounts beyond the
    /// job directory.
    pub async fn run_code(&self, language_label: &str, source: &str) -> TaskResult {
        let lang = match Language::normalize(language_label) {
            Ok(lang) => lang,
            Err(e) => {
                log::warn!("rejecting unsupported language: {e}");
                return TaskResult::unsupported_language();
            }
        };

        let job_dir = match JobDir::create(&self.config.base_dir) {
            Ok(dir) => dir,
            Err(e) => {
                log::error!("failed to stage job: {e}");
                return TaskResult::error(e.kind());
            }
        };

        let filename = format!("main.{}", lang.extension());
        if let Err(e) = job_dir.write(&filename, source) {
            log::error!("failed to write source into job directory: {e}");
            return TaskResult::error(e.kind());
        }

        let argv = lang.invocation(&format!("/sandbox/{filename}"));
        let limits = ResourceLimits::default();
        let run = self
            .invoker
            .run(
                job_dir.path(),
                &[],
                &argv,
                &limits,
                self.config.job_timeout(),
            )
            .await;

        TaskResult::from_run_result(run)
    }

    /// Runs code alongside declared input and output files. `source` has already been
    /// rewritten against `job_id`; `declared_outputs` names the output files the caller
    /// expects to exist once the container exits (the output directory is created ahead
    /// of the run so the container, running as an unprivileged uid, can write into it).
    pub async fn run_code_with_files(
        &self,
        language_label: &str,
        rewritten_source: &str,
        job_id: Uuid,
        declared_outputs: &[String],
    ) -> TaskResult {
        let lang = match Language::normalize(language_label) {
            Ok(lang) => lang,
            Err(e) => {
                log::warn!("rejecting unsupported language: {e}");
                return TaskResult::unsupported_language();
            }
        };

        let job_dir = match JobDir::create(&self.config.base_dir) {
            Ok(dir) => dir,
            Err(e) => {
                log::error!("failed to stage job: {e}");
                return TaskResult::error(e.kind());
            }
        };

        let filename = format!("main.{}", lang.extension());
        if let Err(e) = job_dir.write(&filename, rewritten_source) {
            log::error!("failed to write source into job directory: {e}");
            return TaskResult::error(e.kind());
        }

        let output_dir = self.config.storage_out.join(job_id.to_string());
        if let Err(e) = ensure_writable_output_dir(&output_dir) {
            log::error!(
                "failed to prepare output directory {}: {e}",
                output_dir.display()
            );
            return TaskResult::error(ErrorKind::Internal);
        }

        log::info!(
            "job {job_id}: {} declared output(s) expected, output dir {}",
            declared_outputs.len(),
            output_dir.display()
        );

        let mut mounts = Vec::new();
        let input_dir = self.config.storage_in.join(job_id.to_string());
        if input_dir.exists() {
            mounts.push(Mount {
                host_path: input_dir.clone(),
                container_path: input_dir,
                read_only: true,
            });
        }
        mounts.push(Mount {
            host_path: output_dir.clone(),
            container_path: output_dir.clone(),
            read_only: false,
        });

        let argv = lang.invocation(&format!("/sandbox/{filename}"));
        let limits = ResourceLimits::default();
        let run = self
            .invoker
            .run(
                job_dir.path(),
                &mounts,
                &argv,
                &limits,
                self.config.job_timeout(),
            )
            .await;

        let mut result = TaskResult::from_run_result(run);
        result.output_files = enumerate_output_files(&output_dir);
        result
    }
}

/// Creates the per-job output directory with a mode permitting the container's
/// unprivileged uid to write into it.
fn ensure_writable_output_dir(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o777))?;
    }
    Ok(())
}

/// Enumerates regular files directly under `dir` (non-recursive), sorted ascending by
/// name.
fn enumerate_output_files(dir: &Path) -> Vec<OutputFileEntry> {
    let mut entries = Vec::new();
    let read_dir = match fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            log::warn!(
                "could not enumerate output directory {}: {e}",
                dir.display()
            );
            return entries;
        }
    };

    for entry in read_dir.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let size = fs::metadata(&path).ok().map(|m| m.len());
        entries.push(OutputFileEntry {
            name,
            path: path.to_string_lossy().into_owned(),
            size,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn test_config(base: &Path) -> Arc<AppConfig> {
        Arc::new(AppConfig {
            storage_in: base.join("in"),
            storage_out: base.join("out"),
            base_dir: base.to_path_buf(),
            queue_url: None,
            result_store_url: None,
            saving_mode: crate::config::SavingMode::Local,
            job_timeout_secs: 5,
            truncation_cap: 64_000,
            sandbox_image: crate::language::SANDBOX_IMAGE.to_string(),
        })
    }

    #[tokio::test]
    async fn run_code_with_unsupported_language_returns_synthetic_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let coordinator = JobCoordinator::new(test_config(tmp.path()));
        let result = coordinator.run_code("haskell", "main = return ()").await;

        assert_eq!(result.returncode, Some(2));
        assert_eq!(result.error, Some(ErrorKind::UnsupportedLanguage));
        assert!(result.output_files.is_empty());
    }

    #[test]
    fn enumerate_output_files_skips_directories_and_sorts_ascending() {
        let tmp = tempfile::tempdir().unwrap();
        let out = tmp.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("b.txt"), "b").unwrap();
        fs::write(out.join("a.txt"), "a").unwrap();
        fs::create_dir(out.join("subdir")).unwrap();

        let entries = enumerate_output_files(&out);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "a.txt");
        assert_eq!(entries[1].name, "b.txt");
        assert_eq!(entries[0].size, Some(1));
    }

    #[test]
    fn enumerate_output_files_on_missing_directory_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = enumerate_output_files(&tmp.path().join("nonexistent"));
        assert!(entries.is_empty());
    }
}
