//! Assembles the hardened `docker run` argument vector, launches it under a wall-clock
//! deadline, and returns a normalized `RunResult`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::error::ErrorKind;

const TRUNCATION_MARKER: &str = "\n...[output truncated]...\n";

/// Mandatory runtime constraints, uniform across every supported language. No
/// per-language overrides are offered.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLimits {
    pub cpu_quota: f64,
    pub memory_mib: u64,
    pub max_processes: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_quota: 1.0,
            memory_mib: 512,
            max_processes: 100,
        }
    }
}

/// An additional bind mount beyond the always-present JobDir to `/sandbox` and the `/tmp`
/// tmpfs. Used for the identity mounts of file-aware jobs.
#[derive(Debug, Clone)]
pub struct Mount {
    pub host_path: PathBuf,
    pub container_path: PathBuf,
    pub read_only: bool,
}

/// Normalized record returned by the invoker.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub stdout: String,
    pub stderr: String,
    pub returncode: Option<i32>,
    pub error: Option<ErrorKind>,
}

impl RunResult {
    pub fn error(kind: ErrorKind) -> Self {
        Self {
            stdout: String::new(),
            stderr: String::new(),
            returncode: None,
            error: Some(kind),
        }
    }
}

/// Keeps at most `cap` characters total, reserving room for the trailing marker so a
/// truncated stream never exceeds `cap` characters overall.
fn truncate(mut s: String, cap: usize) -> String {
    if s.chars().count() > cap {
        let marker_len = TRUNCATION_MARKER.chars().count();
        let budget = cap.saturating_sub(marker_len);
        let cut = s
            .char_indices()
            .nth(budget)
            .map(|(i, _)| i)
            .unwrap_or(s.len());
        s.truncate(cut);
        s.push_str(TRUNCATION_MARKER);
    }
    s
}

/// Builds the `docker run` argv and executes it under the hardened constraints.
pub struct ContainerInvoker {
    image: String,
    runtime_binary: String,
    truncation_cap: usize,
}

impl ContainerInvoker {
    pub fn new(image: impl Into<String>, truncation_cap: usize) -> Self {
        Self {
            image: image.into(),
            runtime_binary: "docker".to_string(),
            truncation_cap,
        }
    }

    #[cfg(test)]
    fn with_runtime_binary(
        image: impl Into<String>,
        runtime_binary: impl Into<String>,
        truncation_cap: usize,
    ) -> Self {
        Self {
            image: image.into(),
            runtime_binary: runtime_binary.into(),
            truncation_cap,
        }
    }

    fn build_args(
        &self,
        job_dir: &Path,
        extra_mounts: &[Mount],
        argv: &[String],
        limits: &ResourceLimits,
    ) -> Vec<String> {
        let mut args = vec!["run".to_string(), "--rm".to_string(), "-i".to_string()];

        args.extend([
            "-v".to_string(),
            format!("{}:/sandbox:ro", job_dir.display()),
        ]);
        args.extend(["--tmpfs".to_string(), "/tmp:rw,size=64m".to_string()]);
        for mount in extra_mounts {
            let mode = if mount.read_only { "ro" } else { "rw" };
            args.extend([
                "-v".to_string(),
                format!(
                    "{}:{}:{}",
                    mount.host_path.display(),
                    mount.container_path.display(),
                    mode
                ),
            ]);
        }

        args.extend(["-w".to_string(), "/sandbox".to_string()]);
        args.extend(["--user".to_string(), "1000:1000".to_string()]);
        args.extend(["--read-only".to_string()]);
        args.extend(["--cpus".to_string(), format!("{}", limits.cpu_quota)]);
        args.extend(["--memory".to_string(), format!("{}m", limits.memory_mib)]);
        args.extend([
            "--memory-swap".to_string(),
            format!("{}m", limits.memory_mib),
        ]);
        args.extend(["--pids-limit".to_string(), limits.max_processes.to_string()]);
        args.extend(["--network".to_string(), "none".to_string()]);
        args.extend(["--cap-drop".to_string(), "ALL".to_string()]);
        args.extend([
            "--security-opt".to_string(),
            "no-new-privileges".to_string(),
        ]);

        args.push(self.image.clone());
        args.extend(argv.iter().cloned());
        args
    }

    /// Launches the hardened container and waits up to `timeout`. On deadline expiry the
    /// container is forcibly killed so no zombie process survives.
    pub async fn run(
        &self,
        job_dir: &Path,
        extra_mounts: &[Mount],
        argv: &[String],
        limits: &ResourceLimits,
        timeout: Duration,
    ) -> RunResult {
        let args = self.build_args(job_dir, extra_mounts, argv, limits);
        log::info!("executing: docker {}", args.join(" "));

        let mut child = match Command::new(&self.runtime_binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                log::error!("failed to launch container runtime: {e}");
                return RunResult::error(ErrorKind::LaunchFailed);
            }
        };

        let mut stdout_pipe = child.stdout.take().expect("stdout is piped");
        let mut stderr_pipe = child.stderr.take().expect("stderr is piped");
        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout_pipe.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr_pipe.read_to_end(&mut buf).await;
            buf
        });

        let wait_result = tokio::time::timeout(timeout, child.wait()).await;
        let timed_out = wait_result.is_err();
        if timed_out {
            log::warn!(
                "execution exceeded {:.3}s, killing container",
                timeout.as_secs_f64()
            );
            let _ = child.kill().await;
            let _ = child.wait().await;
        }

        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        let stdout = truncate(
            String::from_utf8_lossy(&stdout_bytes).into_owned(),
            self.truncation_cap,
        );
        let stderr = truncate(
            String::from_utf8_lossy(&stderr_bytes).into_owned(),
            self.truncation_cap,
        );

        if timed_out {
            return RunResult {
                stdout,
                stderr,
                returncode: None,
                error: Some(ErrorKind::TimeoutExceeded),
            };
        }

        match wait_result.unwrap() {
            Ok(status) => RunResult {
                stdout,
                stderr,
                returncode: status.code(),
                error: None,
            },
            Err(e) => {
                log::error!("failed to wait on container process: {e}");
                RunResult {
                    stdout,
                    stderr,
                    returncode: None,
                    error: Some(ErrorKind::Internal),
                }
            }
        }
    }
}
